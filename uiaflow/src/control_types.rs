//! Known UI Automation control type names.
//!
//! Selector steps name control types as strings. This table is the complete
//! accepted set; anything else fails resolution with `InvalidControlType`.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const CONTROL_TYPES: [&str; 41] = [
    "AppBar",
    "Button",
    "Calendar",
    "CheckBox",
    "ComboBox",
    "Custom",
    "DataGrid",
    "DataItem",
    "Document",
    "Edit",
    "Group",
    "Header",
    "HeaderItem",
    "Hyperlink",
    "Image",
    "List",
    "ListItem",
    "Menu",
    "MenuBar",
    "MenuItem",
    "Pane",
    "ProgressBar",
    "RadioButton",
    "ScrollBar",
    "SemanticZoom",
    "Separator",
    "Slider",
    "Spinner",
    "SplitButton",
    "StatusBar",
    "Tab",
    "TabItem",
    "Table",
    "Text",
    "Thumb",
    "TitleBar",
    "ToolBar",
    "ToolTip",
    "Tree",
    "TreeItem",
    "Window",
];

static BY_LOWERCASE: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    CONTROL_TYPES
        .iter()
        .map(|name| (name.to_ascii_lowercase(), *name))
        .collect()
});

/// Canonical spelling for a control type name, matched case-insensitively after trimming.
pub fn lookup(name: &str) -> Option<&'static str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    BY_LOWERCASE.get(&trimmed.to_ascii_lowercase()).copied()
}

pub fn is_known(name: &str) -> bool {
    lookup(name).is_some()
}
