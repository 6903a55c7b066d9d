use crate::clipboard::ClipboardAttempt;
use crate::errors::AutomationError;
use crate::keys::{ParsedKeys, VirtualKey};
use crate::UIElement;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub mod memory;

#[cfg(target_os = "windows")]
pub mod windows;

/// A running process that may own the driven application's main window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub main_window_title: Option<String>,
}

/// The common trait that all platform engines must implement
pub trait AccessibilityEngine: Send + Sync {
    /// Root of the whole desktop tree
    fn desktop(&self) -> Result<UIElement, AutomationError>;

    /// Top-level window of process `pid`, waiting up to `timeout` for it to appear
    fn main_window(&self, pid: u32, timeout: Duration) -> Result<UIElement, AutomationError>;

    /// Processes whose executable name (without extension) equals `name`, case-insensitively
    fn find_processes(&self, name: &str) -> Result<Vec<ProcessInfo>, AutomationError>;

    fn key_press(&self, key: VirtualKey) -> Result<(), AutomationError>;

    /// Holds `modifiers` down, taps `key`, then releases in reverse order
    fn key_chord(&self, modifiers: &[VirtualKey], key: VirtualKey) -> Result<(), AutomationError>;

    /// Types literal text into whatever has keyboard focus
    fn type_text(&self, text: &str) -> Result<(), AutomationError>;

    /// Writes text to the clipboard and verifies it by reading back
    fn set_clipboard_text(&self, text: &str) -> ClipboardAttempt;

    /// Downcast to the concrete engine
    fn as_any(&self) -> &dyn std::any::Any;

    /// Sends a parsed key expression
    fn send_keys(&self, keys: &ParsedKeys) -> Result<(), AutomationError> {
        match keys {
            ParsedKeys::Text(text) => self.type_text(text),
            ParsedKeys::Key(key) => self.key_press(*key),
            ParsedKeys::Chord { modifiers, key } => self.key_chord(modifiers, *key),
        }
    }

    fn select_all(&self) -> Result<(), AutomationError> {
        self.key_chord(&[VirtualKey::CONTROL], VirtualKey::A)
    }

    fn paste(&self) -> Result<(), AutomationError> {
        self.key_chord(&[VirtualKey::CONTROL], VirtualKey::V)
    }
}

/// Create the native engine for the current platform
pub fn create_engine() -> Result<Arc<dyn AccessibilityEngine>, AutomationError> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(windows::WindowsEngine::new()?))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(AutomationError::UnsupportedPlatform(
            "UI Automation is only available on Windows; use the memory engine".to_string(),
        ))
    }
}
