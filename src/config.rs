//! Site configuration, read from `site.yml` in the site root.
//!
//! ```yaml
//! title: Electoral Integrity in Comparative Perspective
//! document: paper.md
//! versions:
//!   - label: Preprint (2024)
//!     file: paper_v1.md
//! citation:
//!   bibtex_file: paper.bib
//!   filename: electoral_integrity.bib
//! allow_raw_html: false
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::citation::{Citation, DEFAULT_BIB_FILENAME};
use crate::error::SiteError;
use crate::loader::DEFAULT_DOCUMENT;

/// Config file looked up in the site root when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "site.yml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Page title and header text.
    pub title: String,
    /// Document loaded at startup, relative to the site root.
    pub document: String,
    /// Alternate versions offered as switch buttons, in display order.
    pub versions: Vec<VersionLink>,
    pub citation: CitationConfig,
    /// Let raw HTML in the markdown through to the page.
    pub allow_raw_html: bool,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "Paper".to_owned(),
            document: DEFAULT_DOCUMENT.to_owned(),
            versions: Vec::new(),
            citation: CitationConfig::default(),
            allow_raw_html: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VersionLink {
    pub label: String,
    pub file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CitationConfig {
    /// Citation text inline in the config. Wins over `bibtex_file`.
    pub bibtex: Option<String>,
    /// File holding the citation text, relative to the site root.
    pub bibtex_file: Option<PathBuf>,
    /// Download file name.
    pub filename: Option<String>,
}

impl SiteConfig {
    /// Parse a config document.
    pub fn from_yaml(text: &str, origin: &Path) -> Result<Self, SiteError> {
        serde_yml::from_str(text).map_err(|e| SiteError::Config {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read and parse the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, SiteError> {
        let text = fs::read_to_string(path).map_err(|source| SiteError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text, path)
    }

    /// Load `explicit` if given, else `<root>/site.yml` if present, else
    /// defaults. An explicit path that cannot be read is an error.
    pub fn discover(root: &Path, explicit: Option<&Path>) -> Result<Self, SiteError> {
        if let Some(path) = explicit {
            log::info!("[config] path={}", path.display());
            return Self::load(path);
        }
        let candidate = root.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            log::info!("[config] path={}", candidate.display());
            Self::load(&candidate)
        } else {
            log::info!("[config] path=none using defaults");
            Ok(Self::default())
        }
    }

    /// Resolve the citation text. `None` when the site has no citation.
    pub fn resolve_citation(&self, root: &Path) -> Result<Option<Citation>, SiteError> {
        let filename = self
            .citation
            .filename
            .clone()
            .unwrap_or_else(|| DEFAULT_BIB_FILENAME.to_owned());

        let bibtex = match (&self.citation.bibtex, &self.citation.bibtex_file) {
            (Some(inline), _) => inline.clone(),
            (None, Some(file)) => {
                let path = root.join(file);
                fs::read_to_string(&path).map_err(|source| SiteError::Io { path, source })?
            }
            (None, None) => return Ok(None),
        };

        Ok(Some(Citation::new(bibtex.trim_end(), filename)))
    }
}
