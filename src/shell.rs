//! HTML page shell served at `/`.
//!
//! The shell carries no paper content: it holds the containers, the version
//! switch buttons and the citation dialog that the wasm module wires up
//! after it fetches and renders the document in the browser.

use crate::citation::{Citation, COPY_LABEL};
use crate::config::SiteConfig;
use crate::loader::loading_html;
use crate::markdown::html_escape;
use crate::web_assets;

/// Build the version switch buttons. Empty when the site has no versions.
fn build_versions_html(site: &SiteConfig) -> String {
    if site.versions.is_empty() {
        return String::new();
    }
    let mut html = String::from("<div id=\"versions\" class=\"versions\">\n");
    html.push_str(&format!(
        "<button type=\"button\" class=\"link-version\" data-file=\"{}\">Current</button>\n",
        html_escape(&site.document)
    ));
    for version in &site.versions {
        html.push_str(&format!(
            "<button type=\"button\" class=\"link-version\" data-file=\"{}\">{}</button>\n",
            html_escape(&version.file),
            html_escape(&version.label)
        ));
    }
    html.push_str("</div>\n");
    html
}

/// Build the citation dialog. Starts hidden (`aria-hidden="true"`).
fn build_modal_html(citation: &Citation) -> String {
    let bibtex = html_escape(&citation.bibtex);
    let filename = html_escape(&citation.filename);
    format!(
        "<div id=\"modal\" class=\"modal\" aria-hidden=\"true\">\n\
<div class=\"modal-dialog\" role=\"dialog\" aria-modal=\"true\" aria-labelledby=\"modal-title\">\n\
<button type=\"button\" id=\"modal-close\" class=\"modal-close\" aria-label=\"Close\">&times;</button>\n\
<h2 id=\"modal-title\">Cite this paper</h2>\n\
<pre id=\"citation-bibtex\">{bibtex}</pre>\n\
<div class=\"modal-actions\">\n\
<button type=\"button\" id=\"copy-bibtex\">{COPY_LABEL}</button>\n\
<button type=\"button\" id=\"download-bib\" data-filename=\"{filename}\">Download .bib</button>\n\
<noscript><a href=\"/{filename}\" download>Download .bib</a></noscript>\n\
</div>\n\
</div>\n\
</div>\n"
    )
}

/// Build the full HTML page shell.
pub fn build_page_shell(site: &SiteConfig, citation: Option<&Citation>) -> String {
    let title = html_escape(&site.title);
    let document = html_escape(&site.document);
    let raw_html = if site.allow_raw_html { "true" } else { "false" };
    let versions_html = build_versions_html(site);
    let loading = loading_html(&site.document);

    let (cite_button, modal_html) = match citation {
        Some(c) => (
            "<button type=\"button\" id=\"cite-btn\" class=\"cite-btn\">Cite</button>\n",
            build_modal_html(c),
        ),
        None => ("", String::new()),
    };

    let css = web_assets::CSS_PATH;
    let js = web_assets::JS_PATH;

    format!(
        "<!DOCTYPE html>\n\
<html lang=\"en\">\n\
<head>\n\
<meta charset=\"utf-8\">\n\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
<title>{title}</title>\n\
<link rel=\"stylesheet\" href=\"{css}\">\n\
</head>\n\
<body>\n\
<header class=\"site-header\">\n\
<h1 class=\"site-title\">{title}</h1>\n\
{cite_button}\
{versions_html}\
</header>\n\
<div class=\"layout\">\n\
<nav class=\"toc-sidebar\" aria-label=\"Table of contents\">\n\
<div id=\"toc-list\"></div>\n\
</nav>\n\
<main id=\"paper\" class=\"content\" data-document=\"{document}\" data-raw-html=\"{raw_html}\">\n\
{loading}\n\
<noscript><p class=\"muted\">This page renders <a href=\"{document}\">{document}</a> in the browser and needs JavaScript.</p></noscript>\n\
</main>\n\
</div>\n\
{modal_html}\
<script type=\"module\" src=\"{js}\"></script>\n\
</body>\n\
</html>\n"
    )
}
