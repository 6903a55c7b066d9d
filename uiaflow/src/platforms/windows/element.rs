use super::types::ThreadSafeWinUIElement;
use super::utils::{create_ui_automation_with_com_init, generate_element_id, wrap};
use crate::element::{TextSource, UIElementAttributes, UIElementImpl};
use crate::errors::AutomationError;
use crate::UIElement;
use std::fmt;
use tracing::debug;
use uiautomation::patterns;
use uiautomation::types::TreeScope;

pub struct WindowsUIElement {
    pub(crate) element: ThreadSafeWinUIElement,
}

impl fmt::Debug for WindowsUIElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowsUIElement").finish()
    }
}

fn non_empty(value: Result<String, uiautomation::Error>) -> Option<String> {
    value.ok().filter(|s| !s.trim().is_empty())
}

impl UIElementImpl for WindowsUIElement {
    fn object_id(&self) -> usize {
        generate_element_id(&self.element.0)
    }

    fn id(&self) -> Option<String> {
        let runtime_id = self.element.0.get_runtime_id().ok()?;
        Some(
            runtime_id
                .iter()
                .map(|part| part.to_string())
                .collect::<Vec<_>>()
                .join("."),
        )
    }

    fn attributes(&self) -> UIElementAttributes {
        let el = &self.element.0;
        UIElementAttributes {
            automation_id: el.get_automation_id().unwrap_or_default(),
            name: el.get_name().unwrap_or_default(),
            class_name: el.get_classname().unwrap_or_default(),
            control_type: el
                .get_control_type()
                .map(|ct| ct.to_string())
                .unwrap_or_default(),
            is_enabled: el.is_enabled().unwrap_or(false),
            bounds: el.get_bounding_rectangle().ok().map(|rect| {
                (
                    rect.get_left() as f64,
                    rect.get_top() as f64,
                    rect.get_width() as f64,
                    rect.get_height() as f64,
                )
            }),
        }
    }

    fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        let automation = create_ui_automation_with_com_init()?;
        let condition = automation.create_true_condition()?;
        let children = self
            .element
            .0
            .find_all(TreeScope::Children, &condition)
            .map_err(|e| AutomationError::PlatformError(format!("Failed to get children: {e}")))?;
        Ok(children.into_iter().map(wrap).collect())
    }

    fn descendants(&self) -> Result<Vec<UIElement>, AutomationError> {
        let automation = create_ui_automation_with_com_init()?;
        let condition = automation.create_true_condition()?;
        let found = self
            .element
            .0
            .find_all(TreeScope::Descendants, &condition)
            .map_err(|e| {
                AutomationError::PlatformError(format!("Failed to get descendants: {e}"))
            })?;
        Ok(found.into_iter().map(wrap).collect())
    }

    fn click(&self) -> Result<(), AutomationError> {
        self.element.0.try_focus();
        debug!("clicking element: {:?}", self.element.0);
        self.element
            .0
            .click()
            .map_err(|e| AutomationError::PlatformError(e.to_string()))
    }

    fn double_click(&self) -> Result<(), AutomationError> {
        self.element.0.try_focus();
        self.element
            .0
            .double_click()
            .map_err(|e| AutomationError::PlatformError(e.to_string()))
    }

    fn right_click(&self) -> Result<(), AutomationError> {
        self.element.0.try_focus();
        self.element
            .0
            .right_click()
            .map_err(|e| AutomationError::PlatformError(e.to_string()))
    }

    fn focus(&self) -> Result<(), AutomationError> {
        self.element
            .0
            .set_focus()
            .map_err(|e| AutomationError::PlatformError(e.to_string()))
    }

    fn has_value_pattern(&self) -> bool {
        self.element
            .0
            .get_pattern::<patterns::UIValuePattern>()
            .is_ok()
    }

    fn set_value(&self, value: &str) -> Result<(), AutomationError> {
        let pattern = self
            .element
            .0
            .get_pattern::<patterns::UIValuePattern>()
            .map_err(|e| {
                AutomationError::UnsupportedOperation(format!(
                    "Element does not support ValuePattern: {e}"
                ))
            })?;
        pattern
            .set_value(value)
            .map_err(|e| AutomationError::PlatformError(e.to_string()))
    }

    fn is_enabled(&self) -> Result<bool, AutomationError> {
        self.element
            .0
            .is_enabled()
            .map_err(|e| AutomationError::ElementNotFound(e.to_string()))
    }

    fn read_text(&self, source: TextSource) -> Result<Option<String>, AutomationError> {
        let el = &self.element.0;
        Ok(match source {
            TextSource::Value => el
                .get_pattern::<patterns::UIValuePattern>()
                .ok()
                .and_then(|p| p.get_value().ok()),
            TextSource::Text => el
                .get_pattern::<patterns::UITextPattern>()
                .ok()
                .and_then(|p| p.get_document_range().ok())
                .and_then(|range| range.get_text(-1).ok()),
            TextSource::LegacyValue => el
                .get_pattern::<patterns::UILegacyIAccessiblePattern>()
                .ok()
                .and_then(|p| non_empty(p.get_value())),
            TextSource::LegacyName => el
                .get_pattern::<patterns::UILegacyIAccessiblePattern>()
                .ok()
                .and_then(|p| non_empty(p.get_name())),
            TextSource::Name => el.get_name().ok(),
        })
    }

    fn process_id(&self) -> Result<u32, AutomationError> {
        self.element.0.get_process_id().map_err(|e| {
            AutomationError::PlatformError(format!("Failed to get process ID for element: {e}"))
        })
    }

    fn activate_window(&self) -> Result<(), AutomationError> {
        use windows::Win32::UI::WindowsAndMessaging::{
            BringWindowToTop, IsIconic, SetForegroundWindow, ShowWindow, SW_RESTORE,
        };

        let hwnd = match self.element.0.get_native_window_handle() {
            Ok(handle) => handle,
            Err(_) => {
                debug!("Could not get native window handle, falling back to set_focus");
                return self.focus();
            }
        };

        unsafe {
            let hwnd_param: windows::Win32::Foundation::HWND = hwnd.into();

            if IsIconic(hwnd_param).as_bool() {
                debug!("Window is minimized, restoring it");
                let _ = ShowWindow(hwnd_param, SW_RESTORE);
            }

            let _ = BringWindowToTop(hwnd_param);

            if !SetForegroundWindow(hwnd_param).as_bool() {
                return Err(AutomationError::PlatformError(
                    "SetForegroundWindow was refused".to_string(),
                ));
            }
        }

        let _ = self.element.0.set_focus();
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn UIElementImpl> {
        Box::new(WindowsUIElement {
            element: self.element.clone(),
        })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
