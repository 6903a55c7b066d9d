use super::element::WindowsUIElement;
use super::types::ThreadSafeWinUIElement;
use crate::errors::AutomationError;
use crate::UIElement;
use std::sync::Arc;
use tracing::debug;
use uiautomation::UIAutomation;
use windows::core::HRESULT;
use windows::Win32::System::Com::{CoInitializeEx, COINIT_MULTITHREADED};

const RPC_E_CHANGED_MODE: HRESULT = HRESULT(0x80010106u32 as i32);

/// Stable element id from its identifying properties
pub fn generate_element_id(element: &uiautomation::UIElement) -> usize {
    let mut to_hash = String::new();
    if let Ok(id) = element.get_automation_id() {
        to_hash.push_str(&id);
    }
    if let Ok(control_type) = element.get_control_type() {
        to_hash.push_str(&control_type.to_string());
    }
    if let Ok(name) = element.get_name() {
        to_hash.push_str(&name);
    }
    if let Ok(class_name) = element.get_classname() {
        to_hash.push_str(&class_name);
    }
    if let Ok(runtime_id) = element.get_runtime_id() {
        for part in runtime_id {
            to_hash.push_str(&part.to_string());
            to_hash.push('.');
        }
    }

    let hash = blake3::hash(to_hash.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[0..8]);
    u64::from_le_bytes(bytes) as usize
}

pub(crate) fn wrap(element: uiautomation::UIElement) -> UIElement {
    #[allow(clippy::arc_with_non_send_sync)]
    let arc_ele = ThreadSafeWinUIElement(Arc::new(element));
    UIElement::new(Box::new(WindowsUIElement { element: arc_ele }))
}

/// UIAutomation instance on a COM-initialised thread
pub(crate) fn create_ui_automation_with_com_init() -> Result<UIAutomation, AutomationError> {
    unsafe {
        let hr = CoInitializeEx(None, COINIT_MULTITHREADED);
        if hr.is_err() && hr != RPC_E_CHANGED_MODE {
            return Err(AutomationError::PlatformError(format!(
                "Failed to initialize COM: {hr}"
            )));
        }
        if hr == RPC_E_CHANGED_MODE {
            debug!("COM already initialized in this thread");
        }
    }

    UIAutomation::new_direct().map_err(|e| AutomationError::PlatformError(e.to_string()))
}
