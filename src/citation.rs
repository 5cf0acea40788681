//! Citation dialog: visibility state and the copy/download actions.

/// Download file name used when the site config does not set one.
pub const DEFAULT_BIB_FILENAME: &str = "citation.bib";

/// MIME type of the downloaded citation blob.
pub const BIB_MIME: &str = "text/plain";

/// Copy button label at rest.
pub const COPY_LABEL: &str = "Copy BibTeX";

/// Copy button label right after a successful copy.
pub const COPIED_LABEL: &str = "Copied!";

/// How long [`COPIED_LABEL`] stays up, in milliseconds.
pub const COPIED_RESET_MS: i32 = 1500;

/// Alert text when the clipboard write is refused.
pub const COPY_FAILED_ALERT: &str = "Could not copy to clipboard. Please copy manually.";

/// User interactions the citation dialog reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalEvent {
    /// The "Cite" button in the page header.
    CiteClicked,
    /// The dialog's close control.
    CloseClicked,
    /// A click that landed on the overlay itself, outside the dialog box.
    BackdropClicked,
    /// A click inside the dialog box.
    DialogClicked,
    EscapePressed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModalVisibility {
    #[default]
    Hidden,
    Visible,
}

impl ModalVisibility {
    /// Next state after `event`.
    pub fn apply(self, event: ModalEvent) -> Self {
        match event {
            ModalEvent::CiteClicked => ModalVisibility::Visible,
            ModalEvent::CloseClicked
            | ModalEvent::BackdropClicked
            | ModalEvent::EscapePressed => ModalVisibility::Hidden,
            ModalEvent::DialogClicked => self,
        }
    }

    /// Value for the overlay's `aria-hidden` attribute.
    pub fn aria_hidden(self) -> &'static str {
        match self {
            ModalVisibility::Hidden => "true",
            ModalVisibility::Visible => "false",
        }
    }

    pub fn is_visible(self) -> bool {
        self == ModalVisibility::Visible
    }
}

/// Result of a clipboard write, mapped to what the user sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Button shows [`COPIED_LABEL`] until the reset timer fires.
    Copied,
    /// A blocking alert shows [`COPY_FAILED_ALERT`].
    Failed,
}

impl CopyOutcome {
    pub fn button_label(self) -> &'static str {
        match self {
            CopyOutcome::Copied => COPIED_LABEL,
            CopyOutcome::Failed => COPY_LABEL,
        }
    }
}

/// The fixed citation offered by the dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub bibtex: String,
    /// Name the browser saves the download under.
    pub filename: String,
}

impl Citation {
    pub fn new(bibtex: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            bibtex: bibtex.into(),
            filename: filename.into(),
        }
    }

    /// `Content-Disposition` value for serving the citation as a download.
    ///
    /// Quotes and backslashes are dropped from the name so the header stays
    /// a valid quoted-string.
    pub fn content_disposition(&self) -> String {
        let name: String = self
            .filename
            .chars()
            .filter(|c| *c != '"' && *c != '\\' && !c.is_control())
            .collect();
        format!("attachment; filename=\"{name}\"")
    }
}
