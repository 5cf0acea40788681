//! Document loading pipeline: fetch → render → table of contents.
//!
//! The fetch goes through [`DocumentSource`] so the same pipeline runs
//! against the browser Fetch API in wasm and against in-memory sources in
//! tests.

use std::cell::Cell;

use crate::error::SiteError;
use crate::markdown::{self, html_escape, HeadingEntry, RenderOptions};
use crate::toc;

/// Document loaded at startup when the page names none.
pub const DEFAULT_DOCUMENT: &str = "paper.md";

/// Where markdown text comes from.
#[allow(async_fn_in_trait)]
pub trait DocumentSource {
    /// Fetch the text of `file`. Non-success responses are errors.
    async fn fetch_text(&self, file: &str) -> Result<String, SiteError>;
}

/// Result of one load cycle, ready to be written into the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded {
        paper_html: String,
        toc_html: String,
        /// Level-2/3 headings the TOC was built from.
        headings: Vec<HeadingEntry>,
    },
    /// The paper container shows an error; the TOC is left as it was.
    Failed { paper_html: String },
}

impl LoadOutcome {
    pub fn paper_html(&self) -> &str {
        match self {
            LoadOutcome::Loaded { paper_html, .. } | LoadOutcome::Failed { paper_html } => {
                paper_html
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadOutcome::Loaded { .. })
    }
}

/// Numbers load cycles so that only the most recent one reaches the page.
///
/// A cycle takes a ticket with [`begin`](Self::begin) before fetching and
/// applies its outcome only if [`is_current`](Self::is_current) still holds.
#[derive(Debug, Default)]
pub struct LoadGeneration {
    latest: Cell<u64>,
}

impl LoadGeneration {
    pub fn begin(&self) -> u64 {
        let ticket = self.latest.get().wrapping_add(1);
        self.latest.set(ticket);
        ticket
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.latest.get() == ticket
    }
}

/// Placeholder shown in the paper container while `file` is being fetched.
pub fn loading_html(file: &str) -> String {
    format!(
        "<p id=\"paper-loading\" class=\"muted\">Loading {}...</p>",
        html_escape(file)
    )
}

/// Inline message shown in place of the paper when loading `file` fails.
pub fn load_error_html(file: &str, err: &SiteError) -> String {
    format!(
        "<p class=\"muted\">Could not load paper content. Check that <code>{}</code> \
exists in the repository root. Error: {}</p>",
        html_escape(file),
        html_escape(&err.to_string())
    )
}

/// Render already-fetched markdown (or the fetch error) into a [`LoadOutcome`].
pub fn present(
    file: &str,
    fetched: Result<String, SiteError>,
    opts: &RenderOptions,
) -> LoadOutcome {
    let rendered = fetched.and_then(|text| {
        let paper = markdown::render(&text, opts)?;
        let headings = toc::select_headings(&text, &paper.headings);
        Ok((paper, headings))
    });

    match rendered {
        Ok((paper, headings)) => {
            log::info!(
                "[load] file={file} bytes={} toc_entries={}",
                paper.html.len(),
                headings.len()
            );
            LoadOutcome::Loaded {
                paper_html: paper.html,
                toc_html: toc::toc_html(&headings),
                headings,
            }
        }
        Err(err) => {
            log::warn!("[load] file={file} error={err}");
            LoadOutcome::Failed {
                paper_html: load_error_html(file, &err),
            }
        }
    }
}

/// Fetch `file` from `source` and run it through the pipeline.
///
/// Never fails: fetch and render errors become [`LoadOutcome::Failed`].
pub async fn load<S: DocumentSource>(source: &S, file: &str, opts: &RenderOptions) -> LoadOutcome {
    log::debug!("[load] file={file} fetching");
    let fetched = source.fetch_text(file).await;
    present(file, fetched, opts)
}
