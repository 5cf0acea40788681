//! Embedded static web assets for the page shell.
//!
//! Both files are compiled into the binary via `include_str!` so the host
//! needs nothing on disk besides the site root itself.

/// URL path the stylesheet is served under.
pub const CSS_PATH: &str = "/assets/papersite.css";

/// URL path the bootstrap script is served under.
pub const JS_PATH: &str = "/assets/papersite.js";

/// Stylesheet for the page shell, the TOC sidebar and the citation dialog.
///
/// Loaded from `src/assets/papersite.css` at compile time.
pub const CSS: &str = include_str!("assets/papersite.css");

/// Bootstrap module: imports the wasm-bindgen glue from `/pkg/` and starts
/// the module, reporting a load failure inside the paper container.
pub const JS: &str = include_str!("assets/papersite.js");
