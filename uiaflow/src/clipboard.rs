use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a clipboard write did not stick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClipboardFailureKind {
    AccessDenied,
    ClipboardBusy,
    Unexpected,
    Unsupported,
}

impl ClipboardFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipboardFailureKind::AccessDenied => "AccessDenied",
            ClipboardFailureKind::ClipboardBusy => "ClipboardBusy",
            ClipboardFailureKind::Unexpected => "Unexpected",
            ClipboardFailureKind::Unsupported => "Unsupported",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "AccessDenied" => Some(ClipboardFailureKind::AccessDenied),
            "ClipboardBusy" => Some(ClipboardFailureKind::ClipboardBusy),
            "Unexpected" => Some(ClipboardFailureKind::Unexpected),
            "Unsupported" => Some(ClipboardFailureKind::Unsupported),
            _ => None,
        }
    }
}

impl fmt::Display for ClipboardFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one write-then-read-back attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipboardAttempt {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<ClipboardFailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_type: Option<String>,
}

impl ClipboardAttempt {
    pub fn success() -> Self {
        Self {
            ok: true,
            failure_kind: None,
            message: None,
            exception_type: None,
        }
    }

    pub fn failure(kind: ClipboardFailureKind, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            failure_kind: Some(kind),
            message: Some(message.into()),
            exception_type: None,
        }
    }

    pub fn with_exception_type(mut self, exception_type: impl Into<String>) -> Self {
        self.exception_type = Some(exception_type.into());
        self
    }

    pub fn verification_failed() -> Self {
        Self::failure(ClipboardFailureKind::Unexpected, "Clipboard verification failed.")
    }
}

/// Writes `text` to the system clipboard and reads it back.
#[cfg(target_os = "windows")]
pub fn set_text_verified(text: &str) -> ClipboardAttempt {
    let mut clipboard = match arboard::Clipboard::new() {
        Ok(c) => c,
        Err(e) => return map_arboard_error(e),
    };
    if let Err(e) = clipboard.set_text(text.to_string()) {
        return map_arboard_error(e);
    }
    match clipboard.get_text() {
        Ok(read_back) if read_back == text => ClipboardAttempt::success(),
        Ok(_) => ClipboardAttempt::verification_failed(),
        Err(e) => map_arboard_error(e),
    }
}

#[cfg(target_os = "windows")]
fn map_arboard_error(error: arboard::Error) -> ClipboardAttempt {
    let kind = match &error {
        arboard::Error::ClipboardOccupied => ClipboardFailureKind::ClipboardBusy,
        arboard::Error::ClipboardNotSupported => ClipboardFailureKind::Unsupported,
        _ => ClipboardFailureKind::Unexpected,
    };
    ClipboardAttempt::failure(kind, error.to_string()).with_exception_type("arboard::Error")
}
