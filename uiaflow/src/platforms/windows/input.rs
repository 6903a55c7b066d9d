//! Keyboard input through `SendInput`

use crate::errors::AutomationError;
use crate::keys::VirtualKey;
use std::mem::size_of;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, KEYBDINPUT, KEYBD_EVENT_FLAGS, KEYEVENTF_KEYUP,
    KEYEVENTF_UNICODE, VIRTUAL_KEY,
};

fn key_input(vk: u16, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(vk),
                wScan: scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn send(inputs: &[INPUT]) -> Result<(), AutomationError> {
    if inputs.is_empty() {
        return Ok(());
    }
    let sent = unsafe { SendInput(inputs, size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        return Err(AutomationError::PlatformError(format!(
            "SendInput injected {sent} of {} events",
            inputs.len()
        )));
    }
    Ok(())
}

pub fn key_chord(modifiers: &[VirtualKey], key: VirtualKey) -> Result<(), AutomationError> {
    let mut inputs = Vec::with_capacity(modifiers.len() * 2 + 2);
    for m in modifiers {
        inputs.push(key_input(m.0, 0, KEYBD_EVENT_FLAGS(0)));
    }
    inputs.push(key_input(key.0, 0, KEYBD_EVENT_FLAGS(0)));
    inputs.push(key_input(key.0, 0, KEYEVENTF_KEYUP));
    for m in modifiers.iter().rev() {
        inputs.push(key_input(m.0, 0, KEYEVENTF_KEYUP));
    }
    send(&inputs)
}

pub fn key_press(key: VirtualKey) -> Result<(), AutomationError> {
    key_chord(&[], key)
}

/// Types text as unicode key events, one UTF-16 unit per down/up pair
pub fn type_text(text: &str) -> Result<(), AutomationError> {
    let mut inputs = Vec::new();
    for unit in text.encode_utf16() {
        if unit == u16::from(b'\n') {
            inputs.push(key_input(VirtualKey::RETURN.0, 0, KEYBD_EVENT_FLAGS(0)));
            inputs.push(key_input(VirtualKey::RETURN.0, 0, KEYEVENTF_KEYUP));
            continue;
        }
        if unit == u16::from(b'\r') {
            continue;
        }
        inputs.push(key_input(0, unit, KEYEVENTF_UNICODE));
        inputs.push(key_input(0, unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP));
    }
    send(&inputs)
}
