//! Selector model: an ordered path of filter steps over the accessibility tree.

use serde::{Deserialize, Serialize};

/// Whether a step searches immediate children or the whole subtree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchKind {
    #[default]
    #[serde(alias = "descendants")]
    Descendants,
    #[serde(alias = "children")]
    Children,
}

/// One hop of a selector path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorStep {
    #[serde(alias = "Search")]
    pub search: SearchKind,
    #[serde(alias = "AutomationId", skip_serializing_if = "Option::is_none")]
    pub automation_id: Option<String>,
    #[serde(alias = "AutomationIdContains", skip_serializing_if = "Option::is_none")]
    pub automation_id_contains: Option<String>,
    #[serde(alias = "Name", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(alias = "NameContains", skip_serializing_if = "Option::is_none")]
    pub name_contains: Option<String>,
    #[serde(alias = "NormalizeWhitespace", skip_serializing_if = "is_false")]
    pub normalize_whitespace: bool,
    #[serde(alias = "IgnoreCase", skip_serializing_if = "is_false")]
    pub ignore_case: bool,
    #[serde(alias = "ClassName", skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(alias = "ClassNameContains", skip_serializing_if = "Option::is_none")]
    pub class_name_contains: Option<String>,
    #[serde(alias = "ControlType", skip_serializing_if = "Option::is_none")]
    pub control_type: Option<String>,
    #[serde(alias = "Index", skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

impl SelectorStep {
    pub fn descendant() -> Self {
        Self::default()
    }

    pub fn child() -> Self {
        Self {
            search: SearchKind::Children,
            ..Self::default()
        }
    }

    pub fn with_automation_id(mut self, id: impl Into<String>) -> Self {
        self.automation_id = Some(id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_name_contains(mut self, name: impl Into<String>) -> Self {
        self.name_contains = Some(name.into());
        self
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    pub fn with_control_type(mut self, control_type: impl Into<String>) -> Self {
        self.control_type = Some(control_type.into());
        self
    }

    pub fn with_index(mut self, index: i64) -> Self {
        self.index = Some(index);
        self
    }

    /// True when at least one property filter is present
    pub fn has_filter(&self) -> bool {
        non_blank(&self.automation_id).is_some()
            || non_blank(&self.automation_id_contains).is_some()
            || non_blank(&self.name).is_some()
            || non_blank(&self.name_contains).is_some()
            || non_blank(&self.class_name).is_some()
            || non_blank(&self.class_name_contains).is_some()
            || non_blank(&self.control_type).is_some()
    }
}

/// Ordered, immutable path of steps locating a single element
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementSelector {
    #[serde(alias = "Path")]
    pub path: Vec<SelectorStep>,
}

impl ElementSelector {
    pub fn new(path: Vec<SelectorStep>) -> Self {
        Self { path }
    }

    pub fn single(step: SelectorStep) -> Self {
        Self { path: vec![step] }
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// `step{i}:{index}` for every step carrying an explicit index
    pub fn used_index(&self) -> Option<String> {
        let parts: Vec<String> = self
            .path
            .iter()
            .enumerate()
            .filter_map(|(i, step)| step.index.map(|index| format!("step{i}:{index}")))
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(";"))
        }
    }
}

/// Lists, per step, the properties where both an exact and a contains filter
/// are set (exact wins). `None` when no step has such an overlap.
pub fn describe_match_rules(selector: &ElementSelector) -> Option<String> {
    let mut rules = Vec::new();
    for (i, step) in selector.path.iter().enumerate() {
        if non_blank(&step.automation_id).is_some() && non_blank(&step.automation_id_contains).is_some() {
            rules.push(format!("step{i}.AutomationId=exact"));
        }
        if non_blank(&step.name).is_some() && non_blank(&step.name_contains).is_some() {
            rules.push(format!("step{i}.Name=exact"));
        }
        if non_blank(&step.class_name).is_some() && non_blank(&step.class_name_contains).is_some() {
            rules.push(format!("step{i}.ClassName=exact"));
        }
    }
    if rules.is_empty() {
        None
    } else {
        Some(rules.join(";"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitConditionKind {
    #[default]
    ElementExists,
    ElementNotExists,
    ElementEnabled,
}

impl WaitConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitConditionKind::ElementExists => "ElementExists",
            WaitConditionKind::ElementNotExists => "ElementNotExists",
            WaitConditionKind::ElementEnabled => "ElementEnabled",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitCondition {
    #[serde(alias = "Kind")]
    pub kind: WaitConditionKind,
    #[serde(alias = "Selector", skip_serializing_if = "Option::is_none")]
    pub selector: Option<ElementSelector>,
}

impl WaitCondition {
    pub fn new(kind: WaitConditionKind, selector: ElementSelector) -> Self {
        Self {
            kind,
            selector: Some(selector),
        }
    }
}
