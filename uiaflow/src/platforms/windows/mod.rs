//! Windows platform implementation
//!
//! Uses the Windows UI Automation API through the `uiautomation` crate,
//! `SendInput` for the keyboard and `arboard` for the clipboard.

pub mod element;
pub mod engine;
pub mod input;
pub mod types;
pub mod utils;

pub use element::WindowsUIElement;
pub use engine::WindowsEngine;
pub use utils::generate_element_id;
