use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fmt::Debug;
use tracing::instrument;

/// Represents a UI element in the driven application's accessibility tree
pub struct UIElement {
    inner: Box<dyn UIElementImpl>,
}

/// Properties the selector engine and the reports read from an element
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct UIElementAttributes {
    pub automation_id: String,
    pub name: String,
    pub class_name: String,
    pub control_type: String,
    pub is_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<(f64, f64, f64, f64)>,
}

impl fmt::Debug for UIElementAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug_struct = f.debug_struct("UIElementAttributes");
        debug_struct.field("control_type", &self.control_type);
        if !self.automation_id.is_empty() {
            debug_struct.field("automation_id", &self.automation_id);
        }
        if !self.name.is_empty() {
            debug_struct.field("name", &self.name);
        }
        if !self.class_name.is_empty() {
            debug_struct.field("class_name", &self.class_name);
        }
        debug_struct.field("is_enabled", &self.is_enabled);
        debug_struct.finish()
    }
}

/// Where a text sample was read from. Order matters: probes try them in sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextSource {
    Value,
    Text,
    LegacyValue,
    LegacyName,
    Name,
}

impl TextSource {
    pub const PROBE_ORDER: [TextSource; 5] = [
        TextSource::Value,
        TextSource::Text,
        TextSource::LegacyValue,
        TextSource::LegacyName,
        TextSource::Name,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextSource::Value => "Value",
            TextSource::Text => "Text",
            TextSource::LegacyValue => "LegacyValue",
            TextSource::LegacyName => "LegacyName",
            TextSource::Name => "Name",
        }
    }
}

/// Interface for platform-specific element implementations
pub trait UIElementImpl: Send + Sync + Debug {
    fn object_id(&self) -> usize;
    /// Platform runtime id, when the platform exposes one
    fn id(&self) -> Option<String>;
    fn attributes(&self) -> UIElementAttributes;
    fn children(&self) -> Result<Vec<UIElement>, AutomationError>;
    /// All descendants in document order. Platforms with a native subtree
    /// query should override the recursive default.
    fn descendants(&self) -> Result<Vec<UIElement>, AutomationError> {
        let mut out = Vec::new();
        let mut stack: Vec<UIElement> = self.children()?.into_iter().rev().collect();
        while let Some(next) = stack.pop() {
            let kids = next.children()?;
            out.push(next);
            stack.extend(kids.into_iter().rev());
        }
        Ok(out)
    }
    fn click(&self) -> Result<(), AutomationError>;
    fn double_click(&self) -> Result<(), AutomationError>;
    fn right_click(&self) -> Result<(), AutomationError>;
    fn focus(&self) -> Result<(), AutomationError>;
    fn has_value_pattern(&self) -> bool;
    fn set_value(&self, value: &str) -> Result<(), AutomationError>;
    fn is_enabled(&self) -> Result<bool, AutomationError>;
    /// Reads text from one source; `Ok(None)` when the element does not support it.
    fn read_text(&self, source: TextSource) -> Result<Option<String>, AutomationError>;
    fn process_id(&self) -> Result<u32, AutomationError>;
    /// Restores and raises the top-level window that owns this element
    fn activate_window(&self) -> Result<(), AutomationError>;
    fn clone_box(&self) -> Box<dyn UIElementImpl>;
    fn as_any(&self) -> &dyn std::any::Any;
}

impl UIElement {
    /// Create a new UI element from any type that implements UIElementImpl
    pub fn new(impl_: Box<dyn UIElementImpl>) -> Self {
        Self { inner: impl_ }
    }

    pub fn object_id(&self) -> usize {
        self.inner.object_id()
    }

    pub fn id(&self) -> Option<String> {
        self.inner.id()
    }

    pub fn attributes(&self) -> UIElementAttributes {
        self.inner.attributes()
    }

    pub fn name(&self) -> String {
        self.inner.attributes().name
    }

    pub fn control_type(&self) -> String {
        self.inner.attributes().control_type
    }

    pub fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        self.inner.children()
    }

    pub fn descendants(&self) -> Result<Vec<UIElement>, AutomationError> {
        self.inner.descendants()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn click(&self) -> Result<(), AutomationError> {
        self.inner.click()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn double_click(&self) -> Result<(), AutomationError> {
        self.inner.double_click()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn right_click(&self) -> Result<(), AutomationError> {
        self.inner.right_click()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn focus(&self) -> Result<(), AutomationError> {
        self.inner.focus()
    }

    pub fn has_value_pattern(&self) -> bool {
        self.inner.has_value_pattern()
    }

    #[instrument(level = "debug", skip(self, value), fields(len = value.len()))]
    pub fn set_value(&self, value: &str) -> Result<(), AutomationError> {
        self.inner.set_value(value)
    }

    pub fn is_enabled(&self) -> Result<bool, AutomationError> {
        self.inner.is_enabled()
    }

    pub fn read_text(&self, source: TextSource) -> Result<Option<String>, AutomationError> {
        self.inner.read_text(source)
    }

    pub fn process_id(&self) -> Result<u32, AutomationError> {
        self.inner.process_id()
    }

    #[instrument(level = "debug", skip(self))]
    pub fn activate_window(&self) -> Result<(), AutomationError> {
        self.inner.activate_window()
    }

    /// Downcast to the concrete platform type
    pub fn as_any(&self) -> &dyn std::any::Any {
        self.inner.as_any()
    }
}

impl Debug for UIElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UIElement")
            .field("attributes", &self.attributes())
            .finish()
    }
}

impl Clone for UIElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl PartialEq for UIElement {
    fn eq(&self, other: &Self) -> bool {
        self.object_id() == other.object_id()
    }
}

impl Eq for UIElement {}

impl std::hash::Hash for UIElement {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.object_id().hash(state);
    }
}
