//! Table of contents builder.
//!
//! Picks the `## ` and `### ` heading lines of the raw markdown, reads each
//! one from the parsed document and turns them into a two-level link list
//! whose anchors match the ids the renderer puts on the same headings.

use crate::markdown::{self, html_escape, HeadingEntry, SourceHeading};

/// Shown in the TOC container when the document has no level-2/3 headings.
pub const NO_HEADINGS_HTML: &str =
    "<p class=\"muted\">No headings to build a table of contents.</p>";

/// A top-level TOC entry with the level-3 entries that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TocItem {
    pub entry: HeadingEntry,
    pub children: Vec<HeadingEntry>,
}

/// Split `text` into lines the way the markdown parser counts them:
/// `\n`, `\r\n` and a lone `\r` all end a line.
fn source_lines(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut rest = text;
    while let Some(pos) = rest.find(|c: char| c == '\r' || c == '\n') {
        lines.push(&rest[..pos]);
        let ending = if rest[pos..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[pos + ending..];
    }
    lines.push(rest);
    lines
}

/// Level of a line matching `^##\s+` (2) or `^###\s+` (3).
fn heading_line_level(line: &str) -> Option<u8> {
    let (level, rest) = match line.strip_prefix("###") {
        Some(rest) => (3, rest),
        None => (2, line.strip_prefix("##")?),
    };
    rest.starts_with(char::is_whitespace).then_some(level)
}

/// Extract level-2 and level-3 headings from raw markdown, in source order.
pub fn extract_headings(markdown: &str) -> Vec<HeadingEntry> {
    select_headings(markdown, &markdown::source_headings(markdown))
}

/// Keep the parsed headings that start on a `## ` or `### ` source line.
///
/// `parsed` comes from the same document (as [`markdown::render`] or
/// [`markdown::source_headings`] returns it), so a line the parser read as
/// code, HTML or paragraph text never becomes an entry, and each entry's
/// text and anchor are the rendered heading's.
pub fn select_headings(markdown: &str, parsed: &[SourceHeading]) -> Vec<HeadingEntry> {
    let mut entries = Vec::new();
    let mut pending = parsed.iter().peekable();

    for (index, line) in source_lines(markdown).into_iter().enumerate() {
        let line_no = index + 1;
        while pending.next_if(|h| h.line < line_no).is_some() {}
        let Some(level) = heading_line_level(line) else {
            continue;
        };
        if let Some(heading) = pending.next_if(|h| h.line == line_no && h.entry.level == level)
        {
            entries.push(heading.entry.clone());
        }
    }

    log::debug!("[toc] entries={}", entries.len());
    entries
}

/// Group level-3 entries under the level-2 entry before them.
///
/// A level-3 entry with no level-2 entry before it stays at the top level.
pub fn nest(entries: &[HeadingEntry]) -> Vec<TocItem> {
    let mut items: Vec<TocItem> = Vec::new();
    for entry in entries {
        match items.last_mut() {
            Some(parent) if entry.level > 2 && parent.entry.level == 2 => {
                parent.children.push(entry.clone());
            }
            _ => items.push(TocItem {
                entry: entry.clone(),
                children: Vec::new(),
            }),
        }
    }
    items
}

fn link_html(entry: &HeadingEntry) -> String {
    format!(
        "<li class=\"toc-h{}\"><a href=\"#{}\">{}</a>",
        entry.level,
        entry.anchor,
        html_escape(&entry.text)
    )
}

/// Build the `<ul>` tree for the TOC container.
pub fn toc_html(entries: &[HeadingEntry]) -> String {
    if entries.is_empty() {
        return NO_HEADINGS_HTML.to_owned();
    }
    let mut html = String::from("<ul>\n");
    for item in nest(entries) {
        html.push_str(&link_html(&item.entry));
        if !item.children.is_empty() {
            html.push_str("\n<ul>\n");
            for child in &item.children {
                html.push_str(&link_html(child));
                html.push_str("</li>\n");
            }
            html.push_str("</ul>\n");
        }
        html.push_str("</li>\n");
    }
    html.push_str("</ul>\n");
    html
}

/// Plain-text outline, one entry per line, level-3 entries indented.
pub fn outline_text(entries: &[HeadingEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let indent = if entry.level == 3 { "  " } else { "" };
        out.push_str(&format!("{indent}{} (#{})\n", entry.text, entry.anchor));
    }
    out
}
