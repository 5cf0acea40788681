//! Browser glue: fetches the paper, writes the rendered HTML and TOC into the
//! page shell, and wires the version switches and the citation dialog.
//!
//! Element ids come from the page shell: `paper`, `toc-list`, `cite-btn`,
//! `modal`, `modal-close`, `citation-bibtex`, `copy-bibtex`, `download-bib`,
//! and the `.link-version` buttons.

use std::cell::Cell;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{spawn_local, JsFuture};
use web_sys::{Document, Element, Event, EventTarget, HtmlAnchorElement, KeyboardEvent, Window};

use crate::citation::{
    CopyOutcome, ModalEvent, ModalVisibility, BIB_MIME, COPIED_RESET_MS, COPY_FAILED_ALERT,
    COPY_LABEL, DEFAULT_BIB_FILENAME,
};
use crate::error::SiteError;
use crate::loader::{self, DocumentSource, LoadGeneration, LoadOutcome, DEFAULT_DOCUMENT};
use crate::markdown::RenderOptions;

/// Best-effort text for a thrown JS value.
fn js_message(value: &JsValue) -> String {
    value
        .as_string()
        .or_else(|| {
            value
                .dyn_ref::<js_sys::Error>()
                .map(|err| String::from(err.message()))
        })
        .unwrap_or_else(|| format!("{value:?}"))
}

fn browser_error(value: JsValue) -> SiteError {
    SiteError::Browser(js_message(&value))
}

/// Register `handler` for `kind` events on `target` for the page lifetime.
fn listen<F>(target: &EventTarget, kind: &str, handler: F) -> Result<(), SiteError>
where
    F: FnMut(Event) + 'static,
{
    let closure = Closure::<dyn FnMut(Event)>::new(handler);
    target
        .add_event_listener_with_callback(kind, closure.as_ref().unchecked_ref())
        .map_err(browser_error)?;
    closure.forget();
    Ok(())
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// [`DocumentSource`] backed by the Fetch API, paths relative to the page.
pub struct BrowserFetch {
    window: Window,
}

/// GET request for `file` in the default (`cors`) mode, so a version may
/// live on another origin.
fn document_request(file: &str) -> Result<web_sys::Request, JsValue> {
    let opts = web_sys::RequestInit::new();
    opts.set_method("GET");
    web_sys::Request::new_with_str_and_init(file, &opts)
}

impl DocumentSource for BrowserFetch {
    async fn fetch_text(&self, file: &str) -> Result<String, SiteError> {
        let network = |e: JsValue| SiteError::Network {
            file: file.to_owned(),
            message: js_message(&e),
        };

        let request = document_request(file).map_err(network)?;

        let value = JsFuture::from(self.window.fetch_with_request(&request))
            .await
            .map_err(network)?;
        let response: web_sys::Response = value
            .dyn_into()
            .map_err(|_| SiteError::Browser("fetch did not return a Response".into()))?;

        if !response.ok() {
            return Err(SiteError::Fetch {
                file: file.to_owned(),
                status: response.status(),
            });
        }

        let body = JsFuture::from(response.text().map_err(network)?)
            .await
            .map_err(network)?;
        body.as_string()
            .ok_or_else(|| SiteError::Browser(format!("response body of {file} is not text")))
    }
}

// ---------------------------------------------------------------------------
// Page
// ---------------------------------------------------------------------------

struct Page {
    window: Window,
    document: Document,
    paper: Element,
    toc_list: Element,
}

impl Page {
    fn from_window() -> Result<Self, SiteError> {
        let window = web_sys::window().ok_or_else(|| SiteError::Browser("no window".into()))?;
        let document = window
            .document()
            .ok_or_else(|| SiteError::Browser("no document".into()))?;
        let paper = by_id(&document, "paper")?;
        let toc_list = by_id(&document, "toc-list")?;
        Ok(Self {
            window,
            document,
            paper,
            toc_list,
        })
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            allow_raw_html: self.paper.get_attribute("data-raw-html").as_deref() == Some("true"),
        }
    }

    fn initial_document(&self) -> String {
        self.paper
            .get_attribute("data-document")
            .filter(|file| !file.is_empty())
            .unwrap_or_else(|| DEFAULT_DOCUMENT.to_owned())
    }
}

fn by_id(document: &Document, id: &'static str) -> Result<Element, SiteError> {
    document
        .get_element_by_id(id)
        .ok_or(SiteError::MissingElement(id))
}

thread_local! {
    /// Shared by the version buttons and `loadDocument`.
    static LOADS: LoadGeneration = LoadGeneration::default();
}

/// Fetch `file`, render it into the paper container and rebuild the TOC.
///
/// If another load starts before this one finishes, this outcome is dropped.
async fn load_into(page: &Page, file: &str, opts: &RenderOptions) {
    let ticket = LOADS.with(LoadGeneration::begin);
    page.paper.set_inner_html(&loader::loading_html(file));
    let source = BrowserFetch {
        window: page.window.clone(),
    };
    let outcome = loader::load(&source, file, opts).await;
    if !LOADS.with(|loads| loads.is_current(ticket)) {
        log::debug!("[load] file={file} superseded");
        return;
    }
    page.paper.set_inner_html(outcome.paper_html());
    if let LoadOutcome::Loaded { toc_html, .. } = &outcome {
        page.toc_list.set_inner_html(toc_html);
    }
}

/// Each `.link-version` button reloads the paper from its `data-file`.
fn bind_versions(page: &Rc<Page>, opts: RenderOptions) -> Result<(), SiteError> {
    let buttons = page
        .document
        .query_selector_all(".link-version")
        .map_err(browser_error)?;
    for i in 0..buttons.length() {
        let Some(button) = buttons.item(i) else {
            continue;
        };
        let page = Rc::clone(page);
        listen(&button, "click", move |event: Event| {
            let file = event
                .current_target()
                .and_then(|target| target.dyn_into::<Element>().ok())
                .and_then(|el| el.get_attribute("data-file"));
            let Some(file) = file else {
                log::warn!("[versions] button without data-file");
                return;
            };
            log::info!("[versions] switch file={file}");
            let page = Rc::clone(&page);
            spawn_local(async move { load_into(&page, &file, &opts).await });
        })?;
    }
    log::debug!("[versions] bound={}", buttons.length());
    Ok(())
}

// ---------------------------------------------------------------------------
// Citation dialog
// ---------------------------------------------------------------------------

async fn write_clipboard(window: &Window, text: &str) -> Result<(), SiteError> {
    let promise = window.navigator().clipboard().write_text(text);
    JsFuture::from(promise)
        .await
        .map(|_| ())
        .map_err(|e| SiteError::Clipboard(js_message(&e)))
}

fn show_copy_outcome(window: &Window, button: &Element, outcome: CopyOutcome) {
    match outcome {
        CopyOutcome::Copied => {
            button.set_text_content(Some(outcome.button_label()));
            let button = button.clone();
            let reset = Closure::once_into_js(move || button.set_text_content(Some(COPY_LABEL)));
            if let Err(e) = window.set_timeout_with_callback_and_timeout_and_arguments_0(
                reset.unchecked_ref(),
                COPIED_RESET_MS,
            ) {
                log::warn!("[citation] label reset not scheduled: {}", js_message(&e));
            }
        }
        CopyOutcome::Failed => {
            if let Err(e) = window.alert_with_message(COPY_FAILED_ALERT) {
                log::warn!("[citation] alert failed: {}", js_message(&e));
            }
        }
    }
}

/// Save `text` as a download named `filename` through a temporary object URL.
fn download_text(document: &Document, text: &str, filename: &str) -> Result<(), SiteError> {
    let parts = js_sys::Array::of1(&JsValue::from_str(text));
    let props = web_sys::BlobPropertyBag::new();
    props.set_type(BIB_MIME);
    let blob =
        web_sys::Blob::new_with_str_sequence_and_options(&parts, &props).map_err(browser_error)?;
    let url = web_sys::Url::create_object_url_with_blob(&blob).map_err(browser_error)?;

    let anchor: HtmlAnchorElement = document
        .create_element("a")
        .map_err(browser_error)?
        .dyn_into()
        .map_err(|_| SiteError::Browser("created element is not an anchor".into()))?;
    anchor.set_href(&url);
    anchor.set_download(filename);

    let body = document.body().ok_or(SiteError::MissingElement("body"))?;
    body.append_child(&anchor).map_err(browser_error)?;
    anchor.click();
    anchor.remove();
    web_sys::Url::revoke_object_url(&url).map_err(browser_error)
}

/// Wire the dialog. Pages without a citation have no `cite-btn` and are skipped.
fn bind_citation(window: &Window, document: &Document) -> Result<(), SiteError> {
    let Some(cite_btn) = document.get_element_by_id("cite-btn") else {
        log::debug!("[citation] no citation on this page");
        return Ok(());
    };
    let modal = by_id(document, "modal")?;
    let close = by_id(document, "modal-close")?;
    let bibtex = by_id(document, "citation-bibtex")?;
    let copy_btn = by_id(document, "copy-bibtex")?;
    let download_btn = by_id(document, "download-bib")?;

    let state = Rc::new(Cell::new(ModalVisibility::default()));
    let dispatch: Rc<dyn Fn(ModalEvent)> = {
        let modal = modal.clone();
        let state = Rc::clone(&state);
        Rc::new(move |event: ModalEvent| {
            let next = state.get().apply(event);
            state.set(next);
            if let Err(e) = modal.set_attribute("aria-hidden", next.aria_hidden()) {
                log::warn!("[citation] aria-hidden not updated: {}", js_message(&e));
            }
        })
    };

    let d = Rc::clone(&dispatch);
    listen(&cite_btn, "click", move |_| d(ModalEvent::CiteClicked))?;

    let d = Rc::clone(&dispatch);
    listen(&close, "click", move |_| d(ModalEvent::CloseClicked))?;

    let d = Rc::clone(&dispatch);
    let overlay: JsValue = modal.clone().into();
    listen(&modal, "click", move |event: Event| {
        let on_overlay = event
            .target()
            .map(|target| JsValue::from(target) == overlay)
            .unwrap_or(false);
        d(if on_overlay {
            ModalEvent::BackdropClicked
        } else {
            ModalEvent::DialogClicked
        });
    })?;

    let d = Rc::clone(&dispatch);
    let keys_state = Rc::clone(&state);
    listen(document, "keydown", move |event: Event| {
        let is_escape = event
            .dyn_ref::<KeyboardEvent>()
            .map(|key| key.key() == "Escape")
            .unwrap_or(false);
        if is_escape && keys_state.get().is_visible() {
            d(ModalEvent::EscapePressed);
        }
    })?;

    let window = window.clone();
    let source = bibtex.clone();
    let button = copy_btn.clone();
    listen(&copy_btn, "click", move |_| {
        let text = source.text_content().unwrap_or_default();
        let window = window.clone();
        let button = button.clone();
        spawn_local(async move {
            let outcome = match write_clipboard(&window, &text).await {
                Ok(()) => CopyOutcome::Copied,
                Err(err) => {
                    log::warn!("[citation] {err}");
                    CopyOutcome::Failed
                }
            };
            show_copy_outcome(&window, &button, outcome);
        });
    })?;

    let document = document.clone();
    let filename = download_btn
        .get_attribute("data-filename")
        .unwrap_or_else(|| DEFAULT_BIB_FILENAME.to_owned());
    listen(&download_btn, "click", move |_| {
        let text = bibtex.text_content().unwrap_or_default();
        match download_text(&document, &text, &filename) {
            Ok(()) => log::info!("[citation] downloaded file={filename}"),
            Err(err) => log::warn!("[citation] download failed: {err}"),
        }
    })?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Module start: wire the page, then load the startup document.
#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    console_log::init_with_level(log::Level::Info).ok();

    let page = match Page::from_window() {
        Ok(page) => Rc::new(page),
        Err(SiteError::MissingElement(id)) => {
            log::warn!("[start] no #{id} on this page, nothing to load");
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };
    let opts = page.render_options();
    bind_versions(&page, opts)?;
    bind_citation(&page.window, &page.document)?;

    let file = page.initial_document();
    log::info!("[start] file={file}");
    spawn_local(async move { load_into(&page, &file, &opts).await });
    Ok(())
}

/// Wire the citation dialog of the current document on its own, for pages
/// that embed the dialog without a paper container.
#[wasm_bindgen(js_name = bindCitationDialog)]
pub fn bind_citation_dialog() -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| SiteError::Browser("no window".into()))?;
    let document = window
        .document()
        .ok_or_else(|| SiteError::Browser("no document".into()))?;
    bind_citation(&window, &document)?;
    Ok(())
}

/// Load `file` into the page, as a version switch button would.
#[wasm_bindgen(js_name = loadDocument)]
pub async fn load_document(file: String) -> Result<(), JsValue> {
    let page = Page::from_window()?;
    let opts = page.render_options();
    load_into(&page, &file, &opts).await;
    Ok(())
}
