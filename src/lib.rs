//! A single-paper site.
//!
//! The browser side (compiled to wasm) fetches the paper's markdown, renders
//! it with comrak, builds a table of contents from its `##`/`###` headings
//! and drives the citation dialog. The native side is a static host that
//! serves the page shell, the wasm package and the paper files untouched.
//!
//! Module map:
//!
//! - [`slug`], [`markdown`], [`toc`], [`loader`], [`citation`]: the pipeline
//!   and dialog logic, shared by both targets.
//! - `web` (wasm32 only): DOM, Fetch, clipboard and download glue.
//! - `config`, `shell`, `serve`, `web_assets` (native only): the host.

pub mod citation;
pub mod error;
pub mod loader;
pub mod markdown;
pub mod slug;
pub mod toc;

#[cfg(not(target_arch = "wasm32"))]
pub mod config;
#[cfg(not(target_arch = "wasm32"))]
pub mod serve;
#[cfg(not(target_arch = "wasm32"))]
pub mod shell;
#[cfg(not(target_arch = "wasm32"))]
pub mod web_assets;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use error::SiteError;
