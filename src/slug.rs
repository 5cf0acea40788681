//! Anchor slugs for headings.
//!
//! The renderer stamps these onto `<h1>`–`<h3>` elements and the TOC builder
//! links to them, so both sides must go through [`slugify`].

/// Convert heading text to a URL-safe anchor slug.
///
/// Algorithm: trim, lowercase, turn every whitespace run into a single `-`,
/// then drop every character that is not an ASCII letter, digit, `_` or `-`.
/// Hyphens produced by separate whitespace runs are kept, so `"a & b"`
/// becomes `"a--b"`.
pub fn slugify(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    let mut in_whitespace = false;
    for c in lowered.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
                in_whitespace = true;
            }
            continue;
        }
        in_whitespace = false;
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            slug.push(c);
        }
    }
    slug
}
