//! Static host for a paper site.
//!
//! Serves the page shell, the embedded assets, the citation download and
//! the files of the site root (markdown, the wasm package, images) as-is.
//! Markdown is never rendered here; the browser does that.

use std::io;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
    Router,
};
use tokio::signal;
use tower_http::compression::CompressionLayer;

use crate::citation::Citation;
use crate::config::SiteConfig;
use crate::error::SiteError;
use crate::shell;
use crate::web_assets;

/// Maximum number of consecutive ports to try before giving up.
const MAX_PORT_ATTEMPTS: u16 = 100;

/// Maximum file size that will be read and served (16 MiB).
pub const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Options collected from the command line.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Site root directory.
    pub root: PathBuf,
    /// Explicit config file; `<root>/site.yml` is used when absent.
    pub config: Option<PathBuf>,
    /// Overrides the config's startup document.
    pub document: Option<String>,
    /// Interface address to bind to.
    pub bind: String,
    /// First port to try.
    pub port: u16,
}

/// Shared application state passed to all request handlers via `Arc<AppState>`.
pub struct AppState {
    /// Directory from which site files are served.
    pub serve_root: PathBuf,
    /// Canonicalized `serve_root` used for symlink-safe containment checks.
    pub canonical_root: PathBuf,
    /// Document the page loads at startup, relative to the root.
    pub document: String,
    /// Page shell, built once at startup.
    pub index_html: String,
    /// Citation offered for download, if the site has one.
    pub citation: Option<Citation>,
}

impl AppState {
    /// Load the site config under `opts.root` and build the page shell.
    pub fn from_options(opts: &ServeOptions) -> Result<Self, SiteError> {
        let serve_root = opts.root.clone();
        let canonical_root = std::fs::canonicalize(&serve_root).map_err(|source| SiteError::Io {
            path: serve_root.clone(),
            source,
        })?;

        let mut site = SiteConfig::discover(&canonical_root, opts.config.as_deref())?;
        if let Some(document) = &opts.document {
            site.document = document.clone();
        }
        if !canonical_root.join(&site.document).is_file() {
            log::warn!(
                "[serve] document={} not found under root; the page will show a load error",
                site.document
            );
        }

        let citation = site.resolve_citation(&canonical_root)?;
        let index_html = shell::build_page_shell(&site, citation.as_ref());

        Ok(Self {
            serve_root,
            canonical_root,
            document: site.document,
            index_html,
            citation,
        })
    }
}

/// Attempt to bind a TCP listener on `bind_addr` starting at `start_port`.
///
/// On `EADDRINUSE` the port is incremented by one and the attempt is retried up
/// to `MAX_PORT_ATTEMPTS` times.  Any other OS error causes an immediate failure
/// without further retries.
pub fn bind_with_retry(bind_addr: &str, start_port: u16) -> Result<(TcpListener, u16), SiteError> {
    let mut port = start_port;
    log::debug!("[bind] trying port={port}");
    for _ in 0..MAX_PORT_ATTEMPTS {
        let addr = format!("{bind_addr}:{port}");
        match TcpListener::bind(&addr) {
            Ok(listener) => {
                log::debug!("[bind] success port={port}");
                return Ok((listener, port));
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                let next = port.wrapping_add(1);
                log::debug!("[bind] EADDRINUSE, trying {next}");
                port = next;
            }
            Err(e) => {
                return Err(SiteError::Bind(format!(
                    "bind {bind_addr}:{port} failed: {e}"
                )));
            }
        }
    }
    Err(SiteError::Bind(format!(
        "exhausted {MAX_PORT_ATTEMPTS} port candidates starting at {start_port}; all ports in use"
    )))
}

// ---------------------------------------------------------------------------
// Path resolution helpers
// ---------------------------------------------------------------------------

/// Percent-decode a URL path byte-by-byte (RFC 3986 §2.1).
///
/// Returns `Err(())` if the encoding is malformed (truncated `%XX` sequence or
/// non-hex digit) or if the decoded byte sequence is not valid UTF-8.
pub fn percent_decode(encoded: &str) -> Result<String, ()> {
    let bytes = encoded.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return Err(());
            }
            let hi = hex_digit(bytes[i + 1])?;
            let lo = hex_digit(bytes[i + 2])?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| ())
}

fn hex_digit(b: u8) -> Result<u8, ()> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(()),
    }
}

/// Normalize a decoded URL path, stripping `.` and `..` components.
///
/// Returns `None` if a `..` would escape the root, which signals a
/// path-traversal attempt.
pub fn normalize_path(decoded: &str) -> Option<PathBuf> {
    let mut parts: Vec<&str> = Vec::new();
    for component in decoded.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            name => parts.push(name),
        }
    }
    Some(parts.iter().collect())
}

/// Derive the `Content-Type` value from a file extension (case-insensitive).
///
/// Markdown is served as `text/markdown`: the browser fetches it as text and
/// renders it itself.
pub fn mime_for_ext(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "md" | "markdown" => "text/markdown; charset=utf-8",
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "wasm" => "application/wasm",
        "json" | "map" => "application/json",
        "bib" | "txt" => "text/plain; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Strong validator built from size and modification time.
fn etag_for(size: u64, mtime_secs: u64) -> String {
    format!("\"{size:x}-{mtime_secs:x}\"")
}

/// Decide whether a conditional GET may be answered with 304.
///
/// `If-None-Match` wins over `If-Modified-Since` when both are present.
fn is_not_modified(headers: &HeaderMap, etag: &str, mtime_secs: u64) -> bool {
    if let Some(inm) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        return inm
            .split(',')
            .map(str::trim)
            .any(|candidate| candidate == "*" || candidate == etag);
    }
    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
        .and_then(|since| since.duration_since(UNIX_EPOCH).ok())
        .map(|since| mtime_secs <= since.as_secs())
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// 404 Not Found with mandatory security headers.
fn not_found_response() -> Response {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::from("Not Found"))
        .expect("not_found_response builder is infallible")
}

/// 413 Content Too Large with mandatory security headers.
fn too_large_response(norm_path: &str, size: u64) -> Response {
    let body = format!(
        "Content Too Large: {norm_path} ({size} bytes exceeds {MAX_FILE_SIZE} byte limit)"
    );
    Response::builder()
        .status(StatusCode::PAYLOAD_TOO_LARGE)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::from(body))
        .expect("too_large_response builder is infallible")
}

fn embedded_response(content_type: &'static str, body: &'static str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::from(body))
        .expect("embedded asset response builder is infallible")
}

// ---------------------------------------------------------------------------
// Axum request handler
// ---------------------------------------------------------------------------

/// Main request handler.
///
/// Steps:
/// 0. `/`, `/index.html`, the embedded assets and the citation download are
///    answered without touching the file system.
/// 1. Percent-decode the raw request path (before any normalisation).
/// 2. Normalise: strip `.`/`..`; reject traversal above root.
/// 3. Resolve `serve_root` + normalised path; only regular files are served.
/// 4. Canonicalise and re-verify containment in `canonical_root`.
/// 5. Reject with 413 if the size exceeds `MAX_FILE_SIZE`.
/// 6. Answer conditional requests with 304 (`ETag` / `Last-Modified`).
/// 7. Return the bytes with a MIME type derived from the extension.
///
/// All responses include `X-Content-Type-Options: nosniff`.
async fn serve_handler(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let raw_path = req.uri().path().to_owned();

    // Step 0: shell and embedded assets.
    match raw_path.as_str() {
        "/" | "/index.html" => {
            log::info!("[request] path={raw_path} mode=shell");
            return Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
                .header("X-Content-Type-Options", "nosniff")
                .header(header::CACHE_CONTROL, "no-cache")
                .body(Body::from(state.index_html.clone()))
                .expect("shell response builder is infallible");
        }
        p if p == web_assets::CSS_PATH => {
            log::info!("[request] path={raw_path} mode=asset");
            return embedded_response("text/css; charset=utf-8", web_assets::CSS);
        }
        p if p == web_assets::JS_PATH => {
            log::info!("[request] path={raw_path} mode=asset");
            return embedded_response("text/javascript; charset=utf-8", web_assets::JS);
        }
        _ => {}
    }

    // Step 1: percent-decode.
    let Ok(decoded) = percent_decode(&raw_path) else {
        log::info!("[resolve] path={raw_path} branch=denied reason=invalid-percent-encoding");
        return not_found_response();
    };

    if let Some(citation) = &state.citation {
        if decoded.strip_prefix('/') == Some(citation.filename.as_str()) {
            log::info!("[request] path={raw_path} mode=citation");
            return Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .header(header::CONTENT_DISPOSITION, citation.content_disposition())
                .header("X-Content-Type-Options", "nosniff")
                .body(Body::from(citation.bibtex.clone()))
                .expect("citation response builder is infallible");
        }
    }

    if decoded.contains('\0') {
        log::info!("[resolve] path={raw_path} branch=denied reason=null-byte");
        return not_found_response();
    }

    // Step 2: normalise.
    let Some(normalized) = normalize_path(&decoded) else {
        log::info!("[resolve] path={raw_path} branch=denied reason=path-traversal");
        return not_found_response();
    };
    let norm_display = normalized.display().to_string();

    // Step 3: regular files only.
    let candidate = state.serve_root.join(&normalized);
    match tokio::fs::metadata(&candidate).await {
        Ok(meta) if meta.is_file() => {}
        _ => {
            log::info!("[resolve] path={norm_display} branch=denied reason=not-found");
            return not_found_response();
        }
    }

    // Step 4: canonicalise and re-verify containment (symlink-safe).
    let Ok(canonical) = tokio::fs::canonicalize(&candidate).await else {
        log::info!("[resolve] path={norm_display} branch=denied reason=canonicalize-failed");
        return not_found_response();
    };
    if !canonical.starts_with(&state.canonical_root) {
        log::info!(
            "[resolve] path={norm_display} branch=denied reason=outside-root canonical={}",
            canonical.display()
        );
        return not_found_response();
    }

    // Step 5: size guard, stat before reading.
    let Ok(meta) = tokio::fs::metadata(&canonical).await else {
        log::info!("[resolve] path={norm_display} branch=denied reason=metadata-failed");
        return not_found_response();
    };
    let size = meta.len();
    if size > MAX_FILE_SIZE {
        log::info!("[resolve] path={norm_display} branch=denied reason=too-large size={size}");
        return too_large_response(&norm_display, size);
    }

    // Step 6: conditional GET.
    let mtime_secs = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let etag = etag_for(size, mtime_secs);
    let last_modified =
        httpdate::fmt_http_date(SystemTime::UNIX_EPOCH + Duration::from_secs(mtime_secs));

    if is_not_modified(req.headers(), &etag, mtime_secs) {
        log::info!("[request] path={norm_display} mode=not-modified");
        return Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::ETAG, &etag)
            .header(header::LAST_MODIFIED, &last_modified)
            .header("X-Content-Type-Options", "nosniff")
            .body(Body::empty())
            .expect("not-modified response builder is infallible");
    }

    // Step 7: bytes as-is.
    let Ok(bytes) = tokio::fs::read(&canonical).await else {
        return not_found_response();
    };
    let ext = canonical
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    log::info!("[request] path={norm_display} mode=file size={size}");
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime_for_ext(ext))
        .header(header::ETAG, &etag)
        .header(header::LAST_MODIFIED, &last_modified)
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::from(bytes))
        .expect("file response builder is infallible")
}

/// Build the router for `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(serve_handler)
        .layer(CompressionLayer::new())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

/// Start the static host for the site described by `opts`.
///
/// Prints a startup banner on stdout and shuts down cleanly on SIGINT.
pub async fn run_serve(opts: ServeOptions) -> Result<(), SiteError> {
    let state = Arc::new(AppState::from_options(&opts)?);

    let (std_listener, bound_port) = bind_with_retry(&opts.bind, opts.port)?;
    std_listener.set_nonblocking(true).map_err(SiteError::Serve)?;
    let listener = tokio::net::TcpListener::from_std(std_listener).map_err(SiteError::Serve)?;

    println!("papersite serve");
    println!("root:     {}", state.canonical_root.display());
    println!("document: {}", state.document);
    println!("url:      http://{}:{}/", opts.bind, bound_port);

    log::info!("[serve] listening on {}:{}", opts.bind, bound_port);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                log::error!("[shutdown] failed to listen for SIGINT: {e}");
            }
            log::info!("[shutdown] complete");
        })
        .await
        .map_err(SiteError::Serve)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
