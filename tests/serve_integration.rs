#![cfg(not(target_arch = "wasm32"))]

use std::fs;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use tempfile::TempDir;

const STARTUP_TIMEOUT: Duration = Duration::from_secs(6);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

const PAPER_MD: &str =
    "# Electoral Integrity\n\n## Abstract\n\nText.\n\n## Data\n\n### Survey Waves\n";

const SITE_YML: &str = "\
title: Electoral Integrity
versions:
  - label: Preprint
    file: paper_v1.md
citation:
  bibtex_file: refs/paper.bib
  filename: electoral_integrity.bib
";

const BIBTEX: &str = "@article{ei2024,\n  title = {Electoral Integrity},\n  year = {2024}\n}\n";

// ---------------------------------------------------------------------------
// Site fixture
// ---------------------------------------------------------------------------

/// A throwaway site root: two paper versions, a wasm package stub, an image
/// and (unless removed) a `site.yml` with a citation.
struct Site {
    _dir: TempDir,
    root: PathBuf,
}

impl Site {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("create site dir");
        let root = dir.path().to_path_buf();
        let site = Self { _dir: dir, root };

        site.write("paper.md", PAPER_MD);
        site.write("paper_v1.md", "# Draft\n");
        site.write("site.yml", SITE_YML);
        site.write("refs/paper.bib", BIBTEX);
        site.write("pkg/papersite_bg.wasm", b"\0asm\x01\0\0\0");
        site.write("figure.png", b"\x89PNG\r\n\x1a\n");
        site
    }

    fn without_config(self) -> Self {
        fs::remove_file(self.root.join("site.yml")).expect("remove site.yml");
        self
    }

    fn with_oversized(self) -> Self {
        let file = fs::File::create(self.root.join("oversized.md")).expect("create oversized");
        file.set_len(MAX_FILE_SIZE + 1).expect("grow oversized");
        self
    }

    fn write(&self, rel: &str, contents: impl AsRef<[u8]>) {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, contents).unwrap_or_else(|e| panic!("write {}: {e}", path.display()));
    }
}

// ---------------------------------------------------------------------------
// Server process
// ---------------------------------------------------------------------------

struct Reply {
    status: u16,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    fn dump(&self) -> String {
        let headers: String = self
            .headers
            .iter()
            .map(|(k, v)| format!("{k}: {}\n", v.to_str().unwrap_or("<binary>")))
            .collect();
        format!("status={}\n{headers}\n{}", self.status, self.text())
    }

    fn expect_status(&self, status: u16) -> &Self {
        assert_eq!(self.status, status, "wrong status\n{}", self.dump());
        self
    }

    fn expect_header(&self, name: &str, value: &str) -> &Self {
        assert_eq!(self.header(name), Some(value), "header {name}\n{}", self.dump());
        self
    }

    fn expect_header_prefix(&self, name: &str, prefix: &str) -> &Self {
        let found = self.header(name).unwrap_or_default();
        assert!(found.starts_with(prefix), "header {name}\n{}", self.dump());
        self
    }

    fn expect_body_contains(&self, needle: &str) -> &Self {
        assert!(self.text().contains(needle), "body lacks {needle:?}\n{}", self.dump());
        self
    }
}

struct Server {
    child: Option<Child>,
    port: u16,
    client: Client,
    raw_client: Client,
}

impl Server {
    fn start(site: &Site) -> Self {
        let port = TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .expect("pick a free port")
            .port();

        let mut child = Command::new(env!("CARGO_BIN_EXE_papersite"))
            .args(["serve", "--bind", "127.0.0.1", "--port", &port.to_string()])
            .arg(&site.root)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn papersite serve");

        wait_until_ready(&mut child, port);

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("http client");
        let raw_client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .no_gzip()
            .no_brotli()
            .build()
            .expect("http client without decoding");

        Self {
            child: Some(child),
            port,
            client,
            raw_client,
        }
    }

    fn get(&self, path: &str) -> Reply {
        self.get_with(path, &[])
    }

    fn get_with(&self, path: &str, headers: &[(&str, &str)]) -> Reply {
        send(&self.client, self.port, path, headers)
    }

    /// Like `get_with`, but leaves encoded bodies untouched.
    fn get_encoded(&self, path: &str, accept_encoding: &str) -> Reply {
        send(
            &self.raw_client,
            self.port,
            path,
            &[("accept-encoding", accept_encoding)],
        )
    }

    /// Status of a hand-written request, for paths an HTTP client would
    /// normalise before sending.
    fn raw_status(&self, path: &str) -> u16 {
        let mut stream = TcpStream::connect(("127.0.0.1", self.port)).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("read timeout");
        write!(
            stream,
            "GET {path} HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n"
        )
        .expect("send request");
        let mut response = String::new();
        stream.read_to_string(&mut response).expect("read response");
        response
            .split_whitespace()
            .nth(1)
            .and_then(|code| code.parse().ok())
            .unwrap_or_else(|| panic!("no status line in {response:?}"))
    }

    /// Send SIGINT and collect the process output once it exits.
    #[cfg(unix)]
    fn interrupt(mut self) -> Output {
        let child = self.child.take().expect("server running");
        let status = Command::new("kill")
            .args(["-INT", &child.id().to_string()])
            .status()
            .expect("run kill");
        assert!(status.success(), "kill -INT failed");
        wait_for_exit(child, Duration::from_secs(5))
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn send(client: &Client, port: u16, path: &str, headers: &[(&str, &str)]) -> Reply {
    let url = format!("http://127.0.0.1:{port}{path}");
    let mut request = client.get(&url);
    for (name, value) in headers {
        request = request.header(*name, *value);
    }
    let response = request
        .send()
        .unwrap_or_else(|e| panic!("GET {url}: {e}"));
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response
        .bytes()
        .unwrap_or_else(|e| panic!("body of {url}: {e}"))
        .to_vec();
    Reply {
        status,
        headers,
        body,
    }
}

fn wait_until_ready(child: &mut Child, port: u16) {
    let started = Instant::now();
    while started.elapsed() < STARTUP_TIMEOUT {
        if let Some(status) = child.try_wait().expect("poll server") {
            let mut stderr = String::new();
            if let Some(mut err) = child.stderr.take() {
                let _ = err.read_to_string(&mut stderr);
            }
            panic!("server exited early ({status})\n{stderr}");
        }
        if TcpStream::connect(("127.0.0.1", port)).is_ok() {
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
    panic!("server not listening on {port} after {STARTUP_TIMEOUT:?}");
}

#[cfg(unix)]
fn wait_for_exit(mut child: Child, timeout: Duration) -> Output {
    let started = Instant::now();
    while child.try_wait().expect("poll server").is_none() && started.elapsed() < timeout {
        thread::sleep(Duration::from_millis(25));
    }
    child.wait_with_output().expect("collect server output")
}

fn run_toc(file: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_papersite"))
        .arg("toc")
        .arg(file)
        .output()
        .expect("run papersite toc")
}

// ---------------------------------------------------------------------------
// Page shell
// ---------------------------------------------------------------------------

#[test]
fn shell_is_served_at_root_and_index() {
    let site = Site::new();
    let server = Server::start(&site);

    for path in ["/", "/index.html"] {
        server
            .get(path)
            .expect_status(200)
            .expect_header_prefix("content-type", "text/html")
            .expect_body_contains("<title>Electoral Integrity</title>")
            .expect_body_contains("id=\"toc-list\"")
            .expect_body_contains("data-document=\"paper.md\"");
    }
}

#[test]
fn shell_leaves_rendering_to_the_browser() {
    let site = Site::new();
    let server = Server::start(&site);

    let reply = server.get("/");
    reply.expect_body_contains("Loading paper.md...");
    assert!(!reply.text().contains("id=\"abstract\""), "{}", reply.dump());
}

#[test]
fn shell_lists_configured_versions() {
    let site = Site::new();
    let server = Server::start(&site);

    server
        .get("/")
        .expect_body_contains("data-file=\"paper.md\">Current</button>")
        .expect_body_contains("class=\"link-version\" data-file=\"paper_v1.md\">Preprint</button>");
}

#[test]
fn shell_embeds_hidden_citation_dialog() {
    let site = Site::new();
    let server = Server::start(&site);

    server
        .get("/")
        .expect_body_contains("id=\"cite-btn\"")
        .expect_body_contains("id=\"modal\" class=\"modal\" aria-hidden=\"true\"")
        .expect_body_contains("title = {Electoral Integrity}");
}

#[test]
fn site_without_config_has_no_citation() {
    let site = Site::new().without_config();
    let server = Server::start(&site);

    let reply = server.get("/");
    reply.expect_status(200);
    assert!(!reply.text().contains("id=\"cite-btn\""), "{}", reply.dump());
    server.get("/citation.bib").expect_status(404);
}

// ---------------------------------------------------------------------------
// Paper files and assets
// ---------------------------------------------------------------------------

#[test]
fn markdown_is_served_as_source() {
    let site = Site::new();
    let server = Server::start(&site);

    let reply = server.get("/paper.md");
    reply
        .expect_status(200)
        .expect_header_prefix("content-type", "text/markdown");
    assert_eq!(reply.text(), PAPER_MD);
}

#[test]
fn missing_version_is_404_with_nosniff() {
    let site = Site::new();
    let server = Server::start(&site);

    server
        .get("/paper_v9.md")
        .expect_status(404)
        .expect_header("x-content-type-options", "nosniff");
}

#[test]
fn citation_download_is_an_attachment() {
    let site = Site::new();
    let server = Server::start(&site);

    let reply = server.get("/electoral_integrity.bib");
    reply.expect_status(200).expect_header(
        "content-disposition",
        "attachment; filename=\"electoral_integrity.bib\"",
    );
    assert_eq!(reply.text(), BIBTEX.trim_end());
}

#[test]
fn wasm_and_images_get_their_mime_types() {
    let site = Site::new();
    let server = Server::start(&site);

    server
        .get("/pkg/papersite_bg.wasm")
        .expect_status(200)
        .expect_header("content-type", "application/wasm");
    server
        .get("/figure.png")
        .expect_status(200)
        .expect_header("content-type", "image/png");
}

#[test]
fn embedded_assets() {
    let site = Site::new();
    let server = Server::start(&site);

    server
        .get("/assets/papersite.css")
        .expect_status(200)
        .expect_header_prefix("content-type", "text/css");
    server
        .get("/assets/papersite.js")
        .expect_status(200)
        .expect_header_prefix("content-type", "text/javascript")
        .expect_body_contains("/pkg/papersite.js");
}

#[test]
fn directories_are_not_listed() {
    let site = Site::new();
    let server = Server::start(&site);

    server.get("/pkg/").expect_status(404);
    server.get("/pkg").expect_status(404);
}

#[test]
fn oversized_file_is_413() {
    let site = Site::new().with_oversized();
    let server = Server::start(&site);

    server
        .get("/oversized.md")
        .expect_status(413)
        .expect_header("x-content-type-options", "nosniff");
}

// ---------------------------------------------------------------------------
// Containment
// ---------------------------------------------------------------------------

#[test]
fn dot_dot_traversal_is_denied() {
    let site = Site::new();
    let server = Server::start(&site);

    assert_eq!(server.raw_status("/../etc/passwd"), 404);
    assert_eq!(server.raw_status("/pkg/../../etc/passwd"), 404);
}

#[test]
fn encoded_traversal_is_denied() {
    let site = Site::new();
    let server = Server::start(&site);

    server.get("/%2e%2e/etc/passwd").expect_status(404);
    server.get("/%2e%2e%2fetc%2fpasswd").expect_status(404);
}

#[cfg(unix)]
#[test]
fn symlink_out_of_root_is_denied() {
    let site = Site::new();
    let elsewhere = tempfile::tempdir().expect("outside dir");
    let secret = elsewhere.path().join("secret.md");
    fs::write(&secret, "# secret\n").expect("write secret");
    std::os::unix::fs::symlink(&secret, site.root.join("escape.md")).expect("symlink");

    let server = Server::start(&site);
    server.get("/escape.md").expect_status(404);
}

// ---------------------------------------------------------------------------
// Conditional requests and compression
// ---------------------------------------------------------------------------

#[test]
fn matching_etag_gets_304() {
    let site = Site::new();
    let server = Server::start(&site);

    let first = server.get("/paper.md");
    let etag = first
        .header("etag")
        .unwrap_or_else(|| panic!("no ETag\n{}", first.dump()))
        .to_owned();
    assert!(etag.starts_with('"') && etag.ends_with('"'), "{etag}");
    assert!(first.header("last-modified").is_some(), "{}", first.dump());

    let again = server.get_with("/paper.md", &[("if-none-match", etag.as_str())]);
    again.expect_status(304);
    assert!(again.body.is_empty(), "{}", again.dump());

    server
        .get_with("/paper.md", &[("if-none-match", "\"stale\"")])
        .expect_status(200);
}

#[test]
fn if_modified_since_is_honoured() {
    let site = Site::new();
    let server = Server::start(&site);

    let tomorrow = httpdate::fmt_http_date(SystemTime::now() + Duration::from_secs(86_400));
    server
        .get_with("/paper.md", &[("if-modified-since", tomorrow.as_str())])
        .expect_status(304);

    let reply = server.get_with(
        "/paper.md",
        &[("if-modified-since", "Thu, 01 Jan 1970 00:00:00 GMT")],
    );
    reply.expect_status(200);
    assert_eq!(reply.text(), PAPER_MD);
}

#[test]
fn shell_is_compressed_on_request() {
    let site = Site::new();
    let server = Server::start(&site);

    server
        .get_encoded("/", "gzip")
        .expect_status(200)
        .expect_header("content-encoding", "gzip");
    server
        .get_encoded("/", "br")
        .expect_status(200)
        .expect_header("content-encoding", "br");
}

// ---------------------------------------------------------------------------
// Process behaviour
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn banner_then_clean_exit_on_sigint() {
    let site = Site::new();
    let server = Server::start(&site);
    server.get("/").expect_status(200);

    let output = server.interrupt();
    assert!(
        output.status.success(),
        "exit {:?}\n{}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.first(), Some(&"papersite serve"), "{stdout}");
    let line_of = |prefix: &str| {
        lines
            .iter()
            .position(|l| l.starts_with(prefix))
            .unwrap_or_else(|| panic!("no {prefix:?} line\n{stdout}"))
    };
    let root = line_of("root:     /");
    let document = line_of("document: paper.md");
    let url = line_of("url:      http://127.0.0.1:");
    assert!(root < document && document < url, "{stdout}");
}

#[test]
fn toc_command_prints_outline() {
    let site = Site::new();
    let output = run_toc(&site.root.join("paper.md"));

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "Abstract (#abstract)\nData (#data)\n  Survey Waves (#survey-waves)\n"
    );
}

#[test]
fn toc_command_reports_missing_file() {
    let site = Site::new();
    let output = run_toc(&site.root.join("nope.md"));

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("nope.md"), "{stderr}");
}
