//! In-memory accessibility tree with scripted behaviours.
//!
//! The tree is loaded from JSON:
//!
//! ```json
//! {
//!   "processes": [{ "pid": 4242, "name": "Autothink", "mainWindow": { ... } }],
//!   "desktop": [{ "automationId": "popup", "visible": false, ... }],
//!   "clipboardFailures": ["ClipboardBusy"]
//! }
//! ```
//!
//! Nodes may carry `onClick` / `onDoubleClick` / `onRightClick` behaviours
//! that show, hide, enable, disable or rewrite other nodes (addressed by
//! automation id), optionally after a delay. Keyboard input lands in the
//! focused node: typed text is inserted, `CTRL+A` selects all and `CTRL+V`
//! pastes the clipboard.

use crate::clipboard::{ClipboardAttempt, ClipboardFailureKind};
use crate::element::{TextSource, UIElementAttributes, UIElementImpl};
use crate::errors::AutomationError;
use crate::keys::VirtualKey;
use crate::platforms::{AccessibilityEngine, ProcessInfo};
use crate::UIElement;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// Built-in tree mimicking the driven application's main window, used by
/// `--engine memory` and the runner's demo mode.
pub const DEMO_TREE_JSON: &str = include_str!("demo_tree.json");

const DESKTOP: usize = 0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSpec {
    pub automation_id: String,
    pub name: String,
    pub class_name: String,
    pub control_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_value_pattern: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<(f64, f64, f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_click: Option<Behavior>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_double_click: Option<Behavior>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_right_click: Option<Behavior>,
    /// Fires whenever the node's content becomes non-empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_text_entered: Option<Behavior>,
    pub focus_fails: bool,
    pub activate_fails: bool,
    pub children: Vec<NodeSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ValueChange {
    pub target: String,
    pub value: String,
}

/// Side effects of interacting with a node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Behavior {
    pub show: Vec<String>,
    pub hide: Vec<String>,
    pub enable: Vec<String>,
    pub disable: Vec<String>,
    pub set_value: Vec<ValueChange>,
    pub set_text: Vec<ValueChange>,
    /// Changes the display name of the target
    pub rename: Vec<ValueChange>,
    /// Effects apply this long after the interaction
    pub delay_ms: u64,
    /// When set, the interaction fails with this message and has no effect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fail: Option<String>,
    /// Follow-up effects, scheduled once these have applied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub then: Option<Box<Behavior>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessSpec {
    pub pid: u32,
    pub name: String,
    pub main_window: NodeSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TreeSpec {
    pub processes: Vec<ProcessSpec>,
    /// Top-level windows not owned by a listed process (popups, dialogs)
    pub desktop: Vec<NodeSpec>,
    /// Consumed one per clipboard write
    pub clipboard_failures: Vec<ClipboardFailureKind>,
    /// Every clipboard write fails with this kind
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clipboard_unavailable: Option<ClipboardFailureKind>,
    /// `CTRL+V` is swallowed without inserting anything
    pub paste_ignored: bool,
    /// Typing fails with this message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub typing_failure: Option<String>,
}

#[derive(Debug, Clone)]
struct Node {
    automation_id: String,
    name: String,
    class_name: String,
    control_type: String,
    enabled: bool,
    visible: bool,
    value: Option<String>,
    text: Option<String>,
    legacy_value: Option<String>,
    legacy_name: Option<String>,
    has_value_pattern: bool,
    bounds: Option<(f64, f64, f64, f64)>,
    on_click: Option<Behavior>,
    on_double_click: Option<Behavior>,
    on_right_click: Option<Behavior>,
    on_text_entered: Option<Behavior>,
    focus_fails: bool,
    activate_fails: bool,
    parent: Option<usize>,
    children: Vec<usize>,
    pid: u32,
}

impl Node {
    fn accepts_text(&self) -> bool {
        self.has_value_pattern || matches!(self.control_type.as_str(), "Edit" | "Document")
    }

    fn content(&self) -> &Option<String> {
        if self.has_value_pattern {
            &self.value
        } else {
            &self.text
        }
    }

    fn content_mut(&mut self) -> &mut Option<String> {
        if self.has_value_pattern {
            &mut self.value
        } else {
            &mut self.text
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Interaction {
    Click,
    DoubleClick,
    RightClick,
}

#[derive(Debug, Default)]
struct MemoryState {
    nodes: Vec<Node>,
    processes: Vec<(u32, String, usize)>,
    focused: Option<usize>,
    select_all_pending: bool,
    clipboard: Option<String>,
    clipboard_failures: VecDeque<ClipboardFailureKind>,
    clipboard_unavailable: Option<ClipboardFailureKind>,
    paste_ignored: bool,
    typing_failure: Option<String>,
    pending: Vec<(Instant, Behavior)>,
    clicks: HashMap<usize, usize>,
    activations: usize,
    key_log: Vec<String>,
    typed: String,
}

impl MemoryState {
    fn from_spec(spec: &TreeSpec) -> Self {
        let mut state = MemoryState {
            clipboard_failures: spec.clipboard_failures.iter().copied().collect(),
            clipboard_unavailable: spec.clipboard_unavailable,
            paste_ignored: spec.paste_ignored,
            typing_failure: spec.typing_failure.clone(),
            ..Default::default()
        };
        let desktop = NodeSpec {
            name: "Desktop".to_string(),
            class_name: "#32769".to_string(),
            control_type: "Pane".to_string(),
            ..Default::default()
        };
        state.add(&desktop, None, 0);
        for process in &spec.processes {
            let id = state.add(&process.main_window, Some(DESKTOP), process.pid);
            state.processes.push((process.pid, process.name.clone(), id));
        }
        for node in &spec.desktop {
            state.add(node, Some(DESKTOP), 0);
        }
        state
    }

    fn add(&mut self, spec: &NodeSpec, parent: Option<usize>, pid: u32) -> usize {
        let id = self.nodes.len();
        let control_type = if spec.control_type.trim().is_empty() {
            "Custom".to_string()
        } else {
            spec.control_type.clone()
        };
        self.nodes.push(Node {
            automation_id: spec.automation_id.clone(),
            name: spec.name.clone(),
            class_name: spec.class_name.clone(),
            control_type,
            enabled: spec.is_enabled.unwrap_or(true),
            visible: spec.visible.unwrap_or(true),
            value: spec.value.clone(),
            text: spec.text.clone(),
            legacy_value: spec.legacy_value.clone(),
            legacy_name: spec.legacy_name.clone(),
            has_value_pattern: spec.has_value_pattern.unwrap_or(spec.value.is_some()),
            bounds: spec.bounds,
            on_click: spec.on_click.clone(),
            on_double_click: spec.on_double_click.clone(),
            on_right_click: spec.on_right_click.clone(),
            on_text_entered: spec.on_text_entered.clone(),
            focus_fails: spec.focus_fails,
            activate_fails: spec.activate_fails,
            parent,
            children: Vec::new(),
            pid,
        });
        if let Some(p) = parent {
            self.nodes[p].children.push(id);
        }
        for child in &spec.children {
            self.add(child, Some(id), pid);
        }
        id
    }

    fn is_live(&self, id: usize) -> bool {
        let mut cursor = Some(id);
        while let Some(i) = cursor {
            match self.nodes.get(i) {
                Some(node) if node.visible => cursor = node.parent,
                _ => return false,
            }
        }
        true
    }

    fn live_node(&self, id: usize) -> Result<&Node, AutomationError> {
        if !self.is_live(id) {
            return Err(AutomationError::StaleElement(format!(
                "element #{id} is no longer in the tree"
            )));
        }
        self.nodes
            .get(id)
            .ok_or_else(|| AutomationError::Internal(format!("unknown node #{id}")))
    }

    fn ids_by_automation_id(&self, automation_id: &str) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.automation_id == automation_id)
            .map(|(i, _)| i)
            .collect()
    }

    fn top_level(&self, id: usize) -> usize {
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            if parent == DESKTOP {
                break;
            }
            current = parent;
        }
        current
    }

    fn apply_due(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let now = Instant::now();
        let (due, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        self.pending = rest;
        for (_, behavior) in due {
            self.apply(&behavior);
        }
    }

    fn apply(&mut self, behavior: &Behavior) {
        for aid in &behavior.show {
            for id in self.ids_by_automation_id(aid) {
                self.nodes[id].visible = true;
            }
        }
        for aid in &behavior.hide {
            for id in self.ids_by_automation_id(aid) {
                self.nodes[id].visible = false;
            }
        }
        for aid in &behavior.enable {
            for id in self.ids_by_automation_id(aid) {
                self.nodes[id].enabled = true;
            }
        }
        for aid in &behavior.disable {
            for id in self.ids_by_automation_id(aid) {
                self.nodes[id].enabled = false;
            }
        }
        for change in &behavior.set_value {
            for id in self.ids_by_automation_id(&change.target) {
                self.nodes[id].value = Some(change.value.clone());
            }
        }
        for change in &behavior.set_text {
            for id in self.ids_by_automation_id(&change.target) {
                self.nodes[id].text = Some(change.value.clone());
            }
        }
        for change in &behavior.rename {
            for id in self.ids_by_automation_id(&change.target) {
                self.nodes[id].name = change.value.clone();
            }
        }
        if let Some(next) = &behavior.then {
            self.schedule((**next).clone());
        }
    }

    fn schedule(&mut self, behavior: Behavior) {
        if behavior.delay_ms == 0 {
            self.apply(&behavior);
        } else {
            let at = Instant::now() + Duration::from_millis(behavior.delay_ms);
            self.pending.push((at, behavior));
        }
    }

    fn content_changed(&mut self, id: usize) {
        let node = &self.nodes[id];
        let has_content = node.content().as_deref().is_some_and(|c| !c.is_empty());
        if let (true, Some(behavior)) = (has_content, node.on_text_entered.clone()) {
            self.schedule(behavior);
        }
    }

    fn interact(&mut self, id: usize, kind: Interaction) -> Result<(), AutomationError> {
        let node = self.live_node(id)?;
        if !node.enabled {
            return Err(AutomationError::ElementNotEnabled(node.automation_id.clone()));
        }
        let behavior = match kind {
            Interaction::Click => node.on_click.clone(),
            Interaction::DoubleClick => node.on_double_click.clone().or_else(|| node.on_click.clone()),
            Interaction::RightClick => node.on_right_click.clone(),
        };
        if let Some(message) = behavior.as_ref().and_then(|b| b.fail.clone()) {
            return Err(AutomationError::PlatformError(message));
        }
        *self.clicks.entry(id).or_insert(0) += 1;
        self.focused = Some(id);
        self.select_all_pending = false;
        if let Some(behavior) = behavior {
            self.schedule(behavior);
        }
        Ok(())
    }

    fn insert_text(&mut self, text: &str) {
        let replace = std::mem::take(&mut self.select_all_pending);
        let Some(id) = self.focused else {
            return;
        };
        if !self.is_live(id) || !self.nodes[id].accepts_text() {
            return;
        }
        let slot = self.nodes[id].content_mut();
        match slot {
            Some(existing) if !replace => existing.push_str(text),
            other => *other = Some(text.to_string()),
        }
        self.content_changed(id);
    }
}

type Shared = Arc<Mutex<MemoryState>>;

fn lock(shared: &Shared) -> MutexGuard<'_, MemoryState> {
    let mut guard = shared.lock().unwrap_or_else(PoisonError::into_inner);
    guard.apply_due();
    guard
}

/// Accessibility engine over a scripted in-memory tree
#[derive(Clone)]
pub struct MemoryEngine {
    state: Shared,
}

impl fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("MemoryEngine")
            .field("nodes", &state.nodes.len())
            .field("processes", &state.processes.len())
            .finish()
    }
}

impl MemoryEngine {
    pub fn new(spec: TreeSpec) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::from_spec(&spec))),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, AutomationError> {
        let spec: TreeSpec = serde_json::from_str(json)
            .map_err(|e| AutomationError::InvalidArgument(format!("invalid tree JSON: {e}")))?;
        Ok(Self::new(spec))
    }

    pub fn demo() -> Result<Self, AutomationError> {
        Self::from_json(DEMO_TREE_JSON)
    }

    fn element(&self, id: usize) -> UIElement {
        UIElement::new(Box::new(MemoryElement {
            state: Arc::clone(&self.state),
            id,
        }))
    }

    fn with_nodes(&self, automation_id: &str, f: impl Fn(&mut Node)) {
        let mut state = lock(&self.state);
        for id in state.ids_by_automation_id(automation_id) {
            f(&mut state.nodes[id]);
        }
    }

    pub fn show(&self, automation_id: &str) {
        self.with_nodes(automation_id, |n| n.visible = true);
    }

    pub fn hide(&self, automation_id: &str) {
        self.with_nodes(automation_id, |n| n.visible = false);
    }

    pub fn set_enabled(&self, automation_id: &str, enabled: bool) {
        self.with_nodes(automation_id, |n| n.enabled = enabled);
    }

    pub fn set_value(&self, automation_id: &str, value: &str) {
        self.with_nodes(automation_id, |n| n.value = Some(value.to_string()));
    }

    pub fn set_text(&self, automation_id: &str, text: &str) {
        self.with_nodes(automation_id, |n| n.text = Some(text.to_string()));
    }

    /// Value-pattern value, or text for nodes without one
    pub fn content_of(&self, automation_id: &str) -> Option<String> {
        let state = lock(&self.state);
        state
            .ids_by_automation_id(automation_id)
            .first()
            .and_then(|id| state.nodes[*id].content().clone())
    }

    pub fn is_visible(&self, automation_id: &str) -> bool {
        let state = lock(&self.state);
        state
            .ids_by_automation_id(automation_id)
            .into_iter()
            .any(|id| state.is_live(id))
    }

    pub fn click_count(&self, automation_id: &str) -> usize {
        let state = lock(&self.state);
        state
            .ids_by_automation_id(automation_id)
            .iter()
            .map(|id| state.clicks.get(id).copied().unwrap_or(0))
            .sum()
    }

    pub fn activation_count(&self) -> usize {
        lock(&self.state).activations
    }

    pub fn clipboard_text(&self) -> Option<String> {
        lock(&self.state).clipboard.clone()
    }

    pub fn push_clipboard_failure(&self, kind: ClipboardFailureKind) {
        lock(&self.state).clipboard_failures.push_back(kind);
    }

    pub fn set_clipboard_unavailable(&self, kind: Option<ClipboardFailureKind>) {
        lock(&self.state).clipboard_unavailable = kind;
    }

    pub fn set_paste_ignored(&self, ignored: bool) {
        lock(&self.state).paste_ignored = ignored;
    }

    pub fn set_typing_failure(&self, message: Option<&str>) {
        lock(&self.state).typing_failure = message.map(str::to_string);
    }

    /// Every key press and chord, e.g. `["CTRL+A", "ENTER"]`
    pub fn key_log(&self) -> Vec<String> {
        lock(&self.state).key_log.clone()
    }

    /// Concatenation of all literal text typed so far
    pub fn typed_text(&self) -> String {
        lock(&self.state).typed.clone()
    }

    pub fn focused_automation_id(&self) -> Option<String> {
        let state = lock(&self.state);
        state.focused.map(|id| state.nodes[id].automation_id.clone())
    }
}

impl AccessibilityEngine for MemoryEngine {
    fn desktop(&self) -> Result<UIElement, AutomationError> {
        Ok(self.element(DESKTOP))
    }

    #[instrument(level = "debug", skip(self))]
    fn main_window(&self, pid: u32, timeout: Duration) -> Result<UIElement, AutomationError> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let state = lock(&self.state);
                if let Some((_, _, id)) = state.processes.iter().find(|(p, _, _)| *p == pid) {
                    if state.is_live(*id) {
                        return Ok(self.element(*id));
                    }
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(AutomationError::Timeout(format!(
                    "Application with PID {pid} not found within {}ms timeout",
                    timeout.as_millis()
                )));
            }
            thread::sleep(Duration::from_millis(50).min(deadline - now));
        }
    }

    fn find_processes(&self, name: &str) -> Result<Vec<ProcessInfo>, AutomationError> {
        let wanted = name.trim().trim_end_matches(".exe").to_lowercase();
        let state = lock(&self.state);
        Ok(state
            .processes
            .iter()
            .filter(|(_, n, _)| n.to_lowercase() == wanted)
            .map(|(pid, n, window)| ProcessInfo {
                pid: *pid,
                name: n.clone(),
                main_window_title: state
                    .is_live(*window)
                    .then(|| state.nodes[*window].name.clone())
                    .filter(|t| !t.is_empty()),
            })
            .collect())
    }

    fn key_press(&self, key: VirtualKey) -> Result<(), AutomationError> {
        let mut state = lock(&self.state);
        state.key_log.push(key_label(key));
        if key == VirtualKey::BACK {
            if let Some(id) = state.focused {
                if let Some(content) = state.nodes[id].content_mut() {
                    content.pop();
                }
            }
        }
        Ok(())
    }

    fn key_chord(&self, modifiers: &[VirtualKey], key: VirtualKey) -> Result<(), AutomationError> {
        let mut state = lock(&self.state);
        let mut label: Vec<String> = modifiers.iter().map(|m| key_label(*m)).collect();
        label.push(key_label(key));
        state.key_log.push(label.join("+"));

        let ctrl_only = modifiers == [VirtualKey::CONTROL];
        if ctrl_only && key == VirtualKey::A {
            state.select_all_pending = true;
        } else if ctrl_only && key == VirtualKey::V {
            if let Some(message) = state.typing_failure.clone() {
                return Err(AutomationError::PlatformError(message));
            }
            if state.paste_ignored {
                debug!("paste swallowed by scripted tree");
                return Ok(());
            }
            if let Some(content) = state.clipboard.clone() {
                state.insert_text(&content);
            }
        }
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), AutomationError> {
        let mut state = lock(&self.state);
        if let Some(message) = state.typing_failure.clone() {
            return Err(AutomationError::PlatformError(message));
        }
        state.typed.push_str(text);
        state.insert_text(text);
        Ok(())
    }

    fn set_clipboard_text(&self, text: &str) -> ClipboardAttempt {
        let mut state = lock(&self.state);
        if let Some(kind) = state.clipboard_unavailable {
            return ClipboardAttempt::failure(kind, "Clipboard unavailable")
                .with_exception_type("ScriptedClipboardFailure");
        }
        if let Some(kind) = state.clipboard_failures.pop_front() {
            return ClipboardAttempt::failure(kind, format!("Scripted clipboard failure: {kind}"))
                .with_exception_type("ScriptedClipboardFailure");
        }
        state.clipboard = Some(text.to_string());
        ClipboardAttempt::success()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn key_label(key: VirtualKey) -> String {
    match key {
        VirtualKey::CONTROL => "CTRL".to_string(),
        VirtualKey::SHIFT => "SHIFT".to_string(),
        VirtualKey::MENU => "ALT".to_string(),
        VirtualKey::LWIN => "WIN".to_string(),
        VirtualKey::RETURN => "ENTER".to_string(),
        VirtualKey::TAB => "TAB".to_string(),
        VirtualKey::ESCAPE => "ESC".to_string(),
        VirtualKey::BACK => "BACKSPACE".to_string(),
        VirtualKey::DELETE => "DELETE".to_string(),
        VirtualKey::SPACE => "SPACE".to_string(),
        VirtualKey::UP => "UP".to_string(),
        VirtualKey::DOWN => "DOWN".to_string(),
        VirtualKey::LEFT => "LEFT".to_string(),
        VirtualKey::RIGHT => "RIGHT".to_string(),
        VirtualKey(code) if (VirtualKey::F1.0..VirtualKey::F1.0 + 12).contains(&code) => {
            format!("F{}", code - VirtualKey::F1.0 + 1)
        }
        VirtualKey(code) => char::from_u32(code as u32)
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_string())
            .unwrap_or_else(|| format!("VK_{code:#04X}")),
    }
}

/// Element handle into a [`MemoryEngine`] tree
pub struct MemoryElement {
    state: Shared,
    id: usize,
}

impl fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryElement").field("id", &self.id).finish()
    }
}

impl MemoryElement {
    fn sibling(&self, id: usize) -> UIElement {
        UIElement::new(Box::new(MemoryElement {
            state: Arc::clone(&self.state),
            id,
        }))
    }
}

impl UIElementImpl for MemoryElement {
    fn object_id(&self) -> usize {
        self.id
    }

    fn id(&self) -> Option<String> {
        Some(format!("mem-{}", self.id))
    }

    fn attributes(&self) -> UIElementAttributes {
        let state = lock(&self.state);
        match state.nodes.get(self.id) {
            Some(node) => UIElementAttributes {
                automation_id: node.automation_id.clone(),
                name: node.name.clone(),
                class_name: node.class_name.clone(),
                control_type: node.control_type.clone(),
                is_enabled: node.enabled,
                bounds: node.bounds,
            },
            None => UIElementAttributes::default(),
        }
    }

    fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        let state = lock(&self.state);
        let node = state.live_node(self.id)?;
        Ok(node
            .children
            .iter()
            .filter(|c| state.nodes[**c].visible)
            .map(|c| self.sibling(*c))
            .collect())
    }

    fn click(&self) -> Result<(), AutomationError> {
        lock(&self.state).interact(self.id, Interaction::Click)
    }

    fn double_click(&self) -> Result<(), AutomationError> {
        lock(&self.state).interact(self.id, Interaction::DoubleClick)
    }

    fn right_click(&self) -> Result<(), AutomationError> {
        lock(&self.state).interact(self.id, Interaction::RightClick)
    }

    fn focus(&self) -> Result<(), AutomationError> {
        let mut state = lock(&self.state);
        let node = state.live_node(self.id)?;
        if node.focus_fails {
            return Err(AutomationError::PlatformError(format!(
                "focus rejected by {}",
                node.automation_id
            )));
        }
        state.focused = Some(self.id);
        state.select_all_pending = false;
        Ok(())
    }

    fn has_value_pattern(&self) -> bool {
        let state = lock(&self.state);
        state
            .nodes
            .get(self.id)
            .map(|n| n.has_value_pattern)
            .unwrap_or(false)
    }

    fn set_value(&self, value: &str) -> Result<(), AutomationError> {
        let mut state = lock(&self.state);
        let node = state.live_node(self.id)?;
        if !node.has_value_pattern {
            return Err(AutomationError::UnsupportedOperation(
                "element does not support the value pattern".to_string(),
            ));
        }
        if !node.enabled {
            return Err(AutomationError::ElementNotEnabled(node.automation_id.clone()));
        }
        state.nodes[self.id].value = Some(value.to_string());
        state.content_changed(self.id);
        Ok(())
    }

    fn is_enabled(&self) -> Result<bool, AutomationError> {
        let state = lock(&self.state);
        Ok(state.live_node(self.id)?.enabled)
    }

    fn read_text(&self, source: TextSource) -> Result<Option<String>, AutomationError> {
        let state = lock(&self.state);
        let node = state.live_node(self.id)?;
        Ok(match source {
            TextSource::Value if node.has_value_pattern => {
                Some(node.value.clone().unwrap_or_default())
            }
            TextSource::Value => None,
            TextSource::Text => node.text.clone(),
            TextSource::LegacyValue => node.legacy_value.clone(),
            TextSource::LegacyName => node.legacy_name.clone(),
            TextSource::Name => Some(node.name.clone()),
        })
    }

    fn process_id(&self) -> Result<u32, AutomationError> {
        let state = lock(&self.state);
        Ok(state.live_node(self.id)?.pid)
    }

    fn activate_window(&self) -> Result<(), AutomationError> {
        let mut state = lock(&self.state);
        state.live_node(self.id)?;
        let top = state.top_level(self.id);
        if state.nodes[top].activate_fails {
            return Err(AutomationError::PlatformError(
                "SetForegroundWindow was refused".to_string(),
            ));
        }
        state.activations += 1;
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn UIElementImpl> {
        Box::new(MemoryElement {
            state: Arc::clone(&self.state),
            id: self.id,
        })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
