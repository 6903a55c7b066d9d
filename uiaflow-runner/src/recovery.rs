//! Runner-side recovery from unexpected UI state.
//!
//! Before a flow runs, and after it fails with a recoverable error kind, the
//! runner looks for well-known prompts (save prompt, license notice, generic
//! OK dialog) and dismisses the first one it recognises. The scope owns its
//! own engine handle for the lifetime of one runner session.

use crate::profiles::LoadedProfile;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uiaflow::finder;
use uiaflow::rpc::{ErrorKind, RpcError};
use uiaflow::{AccessibilityEngine, ElementSelector, OpenStep, StepLogEntry, UIElement};

pub const REPORT_FILE: &str = "unexpected_ui_state.json";

const KEY_POPUP_ROOT: &str = "global.popupRoot";
const KEY_NO_BUTTON: &str = "global.popupNoButton";
const KEY_WARNING_TEXT: &str = "global.popupWarningText";
const KEY_OK_BUTTON: &str = "global.popupOkButton";

const MAIN_WINDOW_TIMEOUT: Duration = Duration::from_millis(500);

/// When the recovery pass runs relative to the flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryStage {
    Preflight,
    Retry(u32),
}

impl fmt::Display for RecoveryStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryStage::Preflight => f.write_str("Preflight"),
            RecoveryStage::Retry(n) => write!(f, "Retry{n}"),
        }
    }
}

#[derive(Debug, Clone)]
struct Handler {
    name: &'static str,
    root: ElementSelector,
    indicator: Option<ElementSelector>,
    button: ElementSelector,
    warning: bool,
    selector_keys: Vec<&'static str>,
}

fn build_handlers(profile: &LoadedProfile) -> Vec<Handler> {
    let Some(root) = profile.get(KEY_POPUP_ROOT) else {
        return Vec::new();
    };
    let mut handlers = Vec::new();
    if let Some(no) = profile.get(KEY_NO_BUTTON) {
        handlers.push(Handler {
            name: "SavePrompt.No",
            root: root.clone(),
            indicator: None,
            button: no.clone(),
            warning: false,
            selector_keys: vec![KEY_POPUP_ROOT, KEY_NO_BUTTON],
        });
    }
    if let (Some(text), Some(ok)) = (profile.get(KEY_WARNING_TEXT), profile.get(KEY_OK_BUTTON)) {
        handlers.push(Handler {
            name: "LicensePrompt.Ok",
            root: root.clone(),
            indicator: Some(text.clone()),
            button: ok.clone(),
            warning: true,
            selector_keys: vec![KEY_POPUP_ROOT, KEY_WARNING_TEXT, KEY_OK_BUTTON],
        });
    }
    if let Some(ok) = profile.get(KEY_OK_BUTTON) {
        handlers.push(Handler {
            name: "GenericOk",
            root: root.clone(),
            indicator: None,
            button: ok.clone(),
            warning: false,
            selector_keys: vec![KEY_POPUP_ROOT, KEY_OK_BUTTON],
        });
    }
    handlers
}

/// One handled prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryEntry {
    pub flow_name: String,
    pub handler_name: String,
    pub stage: String,
    pub selector_keys: Vec<String>,
    pub success: bool,
    pub warning: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at_utc: DateTime<Utc>,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryReport {
    pub generated_at_utc: DateTime<Utc>,
    pub attempts: u32,
    pub handled: u32,
    pub entries: Vec<RecoveryEntry>,
}

/// `uiStateRecovery` block of the run summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoverySummary {
    pub attempts: u32,
    pub handled: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_handler: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_path: Option<String>,
}

/// Result of one recovery pass that found a prompt
#[derive(Debug, Clone, PartialEq)]
pub struct Handled {
    pub handler_name: &'static str,
    pub success: bool,
    pub error: Option<RpcError>,
}

pub struct UiStateRecovery {
    engine: Arc<dyn AccessibilityEngine>,
    process_id: u32,
    desktop_root: bool,
    max_attempts: u32,
    handlers: Vec<Handler>,
    attempts: u32,
    handled: u32,
    last_handler: Option<String>,
    entries: Vec<RecoveryEntry>,
    runner_steps: Vec<StepLogEntry>,
}

impl UiStateRecovery {
    /// `search_root` is `desktop` (default) or `mainWindow`.
    pub fn new(
        engine: Arc<dyn AccessibilityEngine>,
        process_id: u32,
        attach_profile: &LoadedProfile,
        search_root: &str,
        max_attempts: i64,
    ) -> Self {
        let handlers = build_handlers(attach_profile);
        info!(
            "UI state recovery ready: {} handlers, root {}",
            handlers.len(),
            search_root
        );
        Self {
            engine,
            process_id,
            desktop_root: !search_root.trim().eq_ignore_ascii_case("mainWindow"),
            max_attempts: max_attempts.max(1) as u32,
            handlers,
            attempts: 0,
            handled: 0,
            last_handler: None,
            entries: Vec::new(),
            runner_steps: Vec::new(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn handled(&self) -> u32 {
        self.handled
    }

    pub fn entries(&self) -> &[RecoveryEntry] {
        &self.entries
    }

    /// Synthetic `UnexpectedUIState` steps, one per handled prompt
    pub fn runner_steps(&self) -> &[StepLogEntry] {
        &self.runner_steps
    }

    fn search_root(&self) -> Option<UIElement> {
        if self.desktop_root {
            return self.engine.desktop().ok();
        }
        match self.engine.main_window(self.process_id, MAIN_WINDOW_TIMEOUT) {
            Ok(window) => Some(window),
            Err(e) => {
                debug!("main window unavailable for recovery: {e}");
                None
            }
        }
    }

    fn find_popup_root(&self, selector: &ElementSelector) -> Option<UIElement> {
        if let Some(root) = self.search_root() {
            if let Ok(found) = finder::resolve(&root, selector) {
                return Some(found.element);
            }
        }
        if self.desktop_root {
            return None;
        }
        let desktop = self.engine.desktop().ok()?;
        finder::resolve(&desktop, selector).ok().map(|found| found.element)
    }

    /// Looks for a known prompt and dismisses the first match.
    pub fn try_handle(&mut self, flow_name: &str, stage: RecoveryStage) -> Option<Handled> {
        self.attempts += 1;
        let started_at = Utc::now();
        let started = Instant::now();

        let (handler, button) = self.handlers.iter().find_map(|handler| {
            let popup = self.find_popup_root(&handler.root)?;
            if let Some(indicator) = &handler.indicator {
                finder::resolve(&popup, indicator).ok()?;
            }
            let button = finder::resolve(&popup, &handler.button).ok()?.element;
            Some((handler.clone(), button))
        })?;

        let error = button.click().err().map(|e| {
            RpcError::new(ErrorKind::UnexpectedUIState, "UI state handler failed")
                .with_detail("handler", handler.name)
                .with_detail("message", e.to_string())
        });
        let success = error.is_none();
        self.handled += 1;
        self.last_handler = Some(handler.name.to_string());

        let mut step = OpenStep::new("UnexpectedUIState", "Handle unexpected UI state")
            .with_selector(Some(&handler.button))
            .with_param("flowName", flow_name)
            .with_param("stage", stage)
            .with_param("handlerName", handler.name)
            .with_param("matchedSelectorKeys", handler.selector_keys.join(","))
            .with_param("root", if self.desktop_root { "desktop" } else { "mainWindow" });
        let entry = match &error {
            Some(error) => step.fail(error.clone()),
            None if handler.warning => {
                step.param("warning", "true");
                step.warning(RpcError::new(
                    ErrorKind::UnexpectedUIState,
                    format!("Dismissed {}", handler.name),
                ))
            }
            None => step.success(),
        };
        self.runner_steps.push(entry);

        self.entries.push(RecoveryEntry {
            flow_name: flow_name.to_string(),
            handler_name: handler.name.to_string(),
            stage: stage.to_string(),
            selector_keys: handler.selector_keys.iter().map(|k| k.to_string()).collect(),
            success,
            warning: handler.warning,
            error_message: error.as_ref().map(|e| e.message.clone()),
            started_at_utc: started_at,
            duration_ms: started.elapsed().as_millis() as i64,
        });

        if success {
            info!("{} handled by {} ({})", flow_name, handler.name, stage);
        } else {
            warn!("{} handler {} failed ({})", flow_name, handler.name, stage);
        }
        Some(Handled {
            handler_name: handler.name,
            success,
            error,
        })
    }

    pub fn report(&self) -> RecoveryReport {
        RecoveryReport {
            generated_at_utc: Utc::now(),
            attempts: self.attempts,
            handled: self.handled,
            entries: self.entries.clone(),
        }
    }

    pub fn write_report(&self, run_dir: &Path) -> std::io::Result<PathBuf> {
        let path = run_dir.join(REPORT_FILE);
        crate::reports::write_json(&path, &self.report())?;
        Ok(path)
    }

    pub fn summary(&self, evidence_path: Option<&Path>) -> RecoverySummary {
        RecoverySummary {
            attempts: self.attempts,
            handled: self.handled,
            last_handler: self.last_handler.clone(),
            evidence_path: evidence_path.map(|p| p.display().to_string()),
        }
    }
}

impl Drop for UiStateRecovery {
    fn drop(&mut self) {
        debug!(
            "releasing UI state recovery scope ({} attempts, {} handled)",
            self.attempts, self.handled
        );
    }
}
