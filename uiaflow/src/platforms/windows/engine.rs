#![allow(clippy::arc_with_non_send_sync)]

use super::input;
use super::types::ThreadSafeWinUIAutomation;
use super::utils::{create_ui_automation_with_com_init, wrap};
use crate::clipboard::{self, ClipboardAttempt};
use crate::errors::AutomationError;
use crate::keys::VirtualKey;
use crate::platforms::{AccessibilityEngine, ProcessInfo};
use crate::UIElement;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, instrument};
use uiautomation::controls::ControlType;
use uiautomation::filters::{ControlTypeFilter, OrFilter};

pub struct WindowsEngine {
    pub automation: ThreadSafeWinUIAutomation,
}

impl WindowsEngine {
    pub fn new() -> Result<Self, AutomationError> {
        let automation = create_ui_automation_with_com_init()?;
        Ok(Self {
            automation: ThreadSafeWinUIAutomation(Arc::new(automation)),
        })
    }

    fn top_level_window_title(&self, pid: u32) -> Option<String> {
        self.main_window(pid, Duration::from_millis(0))
            .ok()
            .map(|w| w.name())
            .filter(|t| !t.trim().is_empty())
    }
}

impl AccessibilityEngine for WindowsEngine {
    fn desktop(&self) -> Result<UIElement, AutomationError> {
        let root = self.automation.0.get_root_element()?;
        Ok(wrap(root))
    }

    #[instrument(level = "debug", skip(self))]
    fn main_window(&self, pid: u32, timeout: Duration) -> Result<UIElement, AutomationError> {
        let root = self.automation.0.get_root_element()?;
        let timeout_ms = timeout.as_millis() as u64;

        let matcher = self
            .automation
            .0
            .create_matcher()
            .from_ref(&root)
            .depth(1)
            .filter(Box::new(OrFilter {
                left: Box::new(ControlTypeFilter {
                    control_type: ControlType::Window,
                }),
                right: Box::new(ControlTypeFilter {
                    control_type: ControlType::Pane,
                }),
            }))
            .filter_fn(Box::new(move |e: &uiautomation::UIElement| {
                match e.get_process_id() {
                    Ok(element_pid) => Ok(element_pid == pid),
                    Err(_) => Ok(false),
                }
            }))
            .timeout(timeout_ms.max(1));

        let window = matcher.find_first().map_err(|e| {
            AutomationError::Timeout(format!(
                "Application with PID {pid} not found within {timeout_ms}ms timeout: {e}"
            ))
        })?;
        Ok(wrap(window))
    }

    fn find_processes(&self, name: &str) -> Result<Vec<ProcessInfo>, AutomationError> {
        let wanted = name.trim().trim_end_matches(".exe").to_lowercase();
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let mut found: Vec<ProcessInfo> = system
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let exe = process.name().to_string_lossy().to_string();
                let stem = exe.strip_suffix(".exe").unwrap_or(&exe).to_lowercase();
                (stem == wanted).then(|| ProcessInfo {
                    pid: pid.as_u32(),
                    name: exe.clone(),
                    main_window_title: None,
                })
            })
            .collect();
        found.sort_by_key(|p| p.pid);
        for info in &mut found {
            info.main_window_title = self.top_level_window_title(info.pid);
        }
        debug!("found {} process(es) named {}", found.len(), name);
        Ok(found)
    }

    fn key_press(&self, key: VirtualKey) -> Result<(), AutomationError> {
        input::key_press(key)
    }

    fn key_chord(&self, modifiers: &[VirtualKey], key: VirtualKey) -> Result<(), AutomationError> {
        input::key_chord(modifiers, key)
    }

    fn type_text(&self, text: &str) -> Result<(), AutomationError> {
        input::type_text(text)
    }

    fn set_clipboard_text(&self, text: &str) -> ClipboardAttempt {
        clipboard::set_text_verified(text)
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
