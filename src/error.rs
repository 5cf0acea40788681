//! Error type shared by the browser pipeline and the site host.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteError {
    /// The server answered, but not with a 2xx status.
    #[error("Failed to fetch {file}: {status}")]
    Fetch { file: String, status: u16 },

    /// The request never produced a response (offline, CORS, aborted).
    #[error("Failed to fetch {file}: {message}")]
    Network { file: String, message: String },

    #[error("markdown rendering failed: {0}")]
    Render(String),

    #[error("page is missing element #{0}")]
    MissingElement(&'static str),

    /// A browser API call threw or is unavailable.
    #[error("{0}")]
    Browser(String),

    #[error("clipboard write failed: {0}")]
    Clipboard(String),

    #[error("could not read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid site config {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("{0}")]
    Bind(String),

    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

impl SiteError {
    /// Short machine-readable code, attached to JS errors.
    pub fn code(&self) -> &'static str {
        match self {
            SiteError::Fetch { .. } => "FETCH_ERROR",
            SiteError::Network { .. } => "NETWORK_ERROR",
            SiteError::Render(_) => "RENDER_ERROR",
            SiteError::MissingElement(_) => "DOM_ERROR",
            SiteError::Browser(_) => "BROWSER_ERROR",
            SiteError::Clipboard(_) => "CLIPBOARD_ERROR",
            SiteError::Io { .. } => "IO_ERROR",
            SiteError::Config { .. } => "CONFIG_ERROR",
            SiteError::Bind(_) => "BIND_ERROR",
            SiteError::Serve(_) => "SERVE_ERROR",
        }
    }
}

#[cfg(target_arch = "wasm32")]
impl From<SiteError> for wasm_bindgen::JsValue {
    fn from(err: SiteError) -> Self {
        let js_error = js_sys::Error::new(&err.to_string());
        js_sys::Reflect::set(
            &js_error,
            &"code".into(),
            &wasm_bindgen::JsValue::from_str(err.code()),
        )
        .ok();
        js_error.into()
    }
}
