mod rpc_tests;
mod step_log_tests;

use crate::platforms::memory::MemoryEngine;
use crate::platforms::AccessibilityEngine;
use crate::UIElement;
use std::time::Duration;

// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_test_writer()
        .try_init();
}

pub const SAMPLE_TREE: &str = r#"{
  "processes": [
    {
      "pid": 100,
      "name": "Target",
      "mainWindow": {
        "automationId": "Main",
        "name": "Main Window",
        "controlType": "Window",
        "children": [
          {
            "automationId": "toolbar",
            "controlType": "ToolBar",
            "children": [
              { "automationId": "btnSave", "name": "Save   File", "controlType": "Button" },
              { "automationId": "btnOpen", "name": "Open", "controlType": "Button", "className": "PushButton" }
            ]
          },
          {
            "automationId": "list",
            "controlType": "List",
            "children": [
              { "name": "Item", "controlType": "ListItem" },
              { "name": "Item", "controlType": "ListItem", "isEnabled": false }
            ]
          },
          { "automationId": "editor", "controlType": "Edit", "value": "" }
        ]
      }
    }
  ]
}"#;

pub fn sample_engine() -> MemoryEngine {
    MemoryEngine::from_json(SAMPLE_TREE).expect("sample tree parses")
}

pub fn main_window(engine: &MemoryEngine) -> UIElement {
    engine
        .main_window(100, Duration::from_millis(100))
        .expect("main window present")
}
