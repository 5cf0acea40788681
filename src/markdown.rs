//! Markdown rendering.
//!
//! Converts markdown text to HTML using comrak with GFM extensions, then
//! stamps slug `id` attributes onto the `h1`–`h3` elements so the table of
//! contents can link to them.

use comrak::{
    format_html,
    nodes::{AstNode, NodeValue},
    parse_document, Arena, Options,
};

use crate::error::SiteError;
use crate::slug::slugify;

/// Deepest heading level that receives an anchor id.
pub const MAX_ANCHORED_LEVEL: u8 = 3;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// A heading with the anchor id it carries in the rendered page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingEntry {
    /// Heading level (1–6).
    pub level: u8,
    /// Plain-text content of the heading.
    pub text: String,
    /// Slug of `text`. Not de-duplicated: repeated headings share an anchor.
    pub anchor: String,
}

impl HeadingEntry {
    pub fn new(level: u8, text: impl Into<String>) -> Self {
        let text = text.into();
        let anchor = slugify(&text);
        Self {
            level,
            text,
            anchor,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Pass raw HTML from the document through instead of omitting it.
    pub allow_raw_html: bool,
}

/// An anchored heading and the 1-based source line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHeading {
    pub line: usize,
    pub entry: HeadingEntry,
}

/// Output of [`render`].
#[derive(Debug, Clone)]
pub struct RenderedPaper {
    /// HTML fragment for the paper container, heading ids included.
    pub html: String,
    /// `h1`–`h3` headings in document order.
    pub headings: Vec<SourceHeading>,
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Build comrak options: strikethrough, tables, autolinks and task lists.
/// Raw HTML is replaced with `<!-- raw HTML omitted -->` unless the site
/// opts in.
fn make_options(opts: &RenderOptions) -> Options<'static> {
    let mut options = Options::default();
    options.extension.strikethrough = true;
    options.extension.table = true;
    options.extension.autolink = true;
    options.extension.tasklist = true;
    options.render.unsafe_ = opts.allow_raw_html;
    options
}

/// Recursively collect plain-text content of a heading AST node.
fn collect_heading_text<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    for child in node.children() {
        match &child.data.borrow().value {
            NodeValue::Text(s) => text.push_str(s),
            NodeValue::Code(c) => text.push_str(&c.literal),
            NodeValue::SoftBreak | NodeValue::LineBreak => text.push(' '),
            _ => text.push_str(&collect_heading_text(child)),
        }
    }
    text
}

/// `h1`–`h3` headings of a parsed document, in document order.
fn collect_headings<'a>(root: &'a AstNode<'a>) -> Vec<SourceHeading> {
    let mut headings = Vec::new();
    for node in root.descendants() {
        let (level, line) = {
            let ast = node.data.borrow();
            match &ast.value {
                NodeValue::Heading(nh) if nh.level <= MAX_ANCHORED_LEVEL => {
                    (nh.level, ast.sourcepos.start.line)
                }
                _ => continue,
            }
        };
        headings.push(SourceHeading {
            line,
            entry: HeadingEntry::new(level, collect_heading_text(node)),
        });
    }
    headings
}

/// Add `id` attributes to heading open tags, walking the HTML once.
///
/// `headings` must be in document order. Each entry consumes the next
/// `<hN>` tag of its level after the previous match.
fn inject_heading_ids(html: &str, headings: &[SourceHeading]) -> String {
    let mut out = String::with_capacity(html.len() + headings.len() * 24);
    let mut rest = html;
    for SourceHeading { entry: heading, .. } in headings {
        let tag = format!("<h{}>", heading.level);
        let Some(pos) = rest.find(&tag) else {
            break;
        };
        out.push_str(&rest[..pos]);
        if heading.anchor.is_empty() {
            out.push_str(&tag);
        } else {
            // anchor is a slug: [a-z0-9_-] only, safe inside the attribute.
            out.push_str(&format!("<h{} id=\"{}\">", heading.level, heading.anchor));
        }
        rest = &rest[pos + tag.len()..];
    }
    out.push_str(rest);
    out
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Minimal HTML entity escaping for text content and attribute values.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Parse `input` and return its `h1`–`h3` headings with their source lines,
/// exactly as [`render`] would anchor them.
pub fn source_headings(input: &str) -> Vec<SourceHeading> {
    let arena = Arena::new();
    let options = make_options(&RenderOptions::default());
    let root = parse_document(&arena, input, &options);
    collect_headings(root)
}

/// Render a markdown string to HTML and collect the anchored headings.
pub fn render(input: &str, opts: &RenderOptions) -> Result<RenderedPaper, SiteError> {
    let arena = Arena::new();
    let options = make_options(opts);
    let root = parse_document(&arena, input, &options);

    let headings = collect_headings(root);

    let mut html_bytes = Vec::new();
    format_html(root, &options, &mut html_bytes).map_err(|e| SiteError::Render(e.to_string()))?;
    let html = String::from_utf8(html_bytes).map_err(|e| SiteError::Render(e.to_string()))?;

    log::debug!("[render] bytes={} headings={}", html.len(), headings.len());

    Ok(RenderedPaper {
        html: inject_heading_ids(&html, &headings),
        headings,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
