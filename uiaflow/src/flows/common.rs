//! Pieces every flow is assembled from: search roots, rooted finds, wait
//! conditions, argument parsing and the scripted "open dialog" steps.

use super::context::FlowContext;
use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::finder::{self, FinderFailure, FinderFailureKind, Found};
use crate::keys;
use crate::platforms::AccessibilityEngine;
use crate::rpc::{create_error, map_find_failure, ErrorKind, RpcError, SetTextMode};
use crate::selector::{ElementSelector, WaitCondition, WaitConditionKind};
use crate::step_log::OpenStep;
use crate::waiter::{self, DEFAULT_POLL_INTERVAL};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Minimum time a main-window search gets before the desktop is tried.
const MIN_MAIN_WINDOW_PHASE_MS: u64 = 200;

/// Where selectors are resolved from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchRoot {
    MainWindow,
    Desktop,
}

impl SearchRoot {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchRoot::MainWindow => "mainWindow",
            SearchRoot::Desktop => "desktop",
        }
    }

    /// Case-insensitive; blank yields `default`, anything unknown `None`.
    pub fn parse(value: Option<&str>, default: SearchRoot) -> Option<SearchRoot> {
        match value.map(str::trim) {
            None | Some("") => Some(default),
            Some(v) if v.eq_ignore_ascii_case("mainWindow") => Some(SearchRoot::MainWindow),
            Some(v) if v.eq_ignore_ascii_case("desktop") => Some(SearchRoot::Desktop),
            Some(_) => None,
        }
    }
}

/// Records `root`, plus the fallback chain when searching from the main window.
pub fn add_root_params(step: &mut OpenStep, root: SearchRoot) {
    step.param("root", root.as_str());
    if root == SearchRoot::MainWindow {
        step.param("roots", "MainWindow->Desktop");
    }
}

/// The two elements every flow searches under
#[derive(Debug, Clone)]
pub struct Roots {
    pub main_window: UIElement,
    pub desktop: UIElement,
}

impl Roots {
    pub fn get(&self, root: SearchRoot) -> &UIElement {
        match root {
            SearchRoot::MainWindow => &self.main_window,
            SearchRoot::Desktop => &self.desktop,
        }
    }

    /// Polls for `selector`. From the main window the first half of the
    /// budget (at least 200 ms) searches the window and the rest the desktop.
    pub fn find(
        &self,
        root: SearchRoot,
        selector: &ElementSelector,
        timeout_ms: u64,
    ) -> Result<Found, FinderFailure> {
        let start = Instant::now();
        let deadline = start + Duration::from_millis(timeout_ms);
        let mut last = None;

        if root == SearchRoot::MainWindow {
            let split = start + Duration::from_millis(MIN_MAIN_WINDOW_PHASE_MS.max(timeout_ms / 2));
            if let Some(found) = poll_resolve(&self.main_window, selector, split, &mut last) {
                return Ok(found);
            }
            if is_permanent(last.as_ref()) {
                return Err(last.unwrap_or_else(not_found));
            }
            debug!("falling back to desktop search");
        }

        match poll_resolve(&self.desktop, selector, deadline, &mut last) {
            Some(found) => Ok(found),
            None => Err(last.unwrap_or_else(not_found)),
        }
    }

    /// `find` with the failure mapped onto the public taxonomy
    pub fn find_element(
        &self,
        root: SearchRoot,
        selector: &ElementSelector,
        timeout_ms: u64,
    ) -> Result<UIElement, RpcError> {
        self.find(root, selector, timeout_ms)
            .map(|found| found.element)
            .map_err(|failure| map_find_failure(&failure))
    }

    /// Single evaluation of a wait condition. With the main window as root,
    /// existence checks consult the window first and then the desktop; an
    /// element is only absent when neither contains it.
    pub fn evaluate(&self, root: SearchRoot, condition: &WaitCondition) -> bool {
        evaluate_in(&self.candidates(root), condition)
    }

    /// One resolution attempt, main window before desktop when rooted at the
    /// main window.
    pub fn locate(&self, root: SearchRoot, selector: &ElementSelector) -> Option<UIElement> {
        locate_in(&self.candidates(root), selector)
    }

    fn candidates(&self, root: SearchRoot) -> Vec<&UIElement> {
        match root {
            SearchRoot::Desktop => vec![&self.desktop],
            SearchRoot::MainWindow => vec![&self.main_window, &self.desktop],
        }
    }
}

/// First of `roots` under which `selector` resolves
pub fn locate_in(roots: &[&UIElement], selector: &ElementSelector) -> Option<UIElement> {
    roots
        .iter()
        .find_map(|r| finder::resolve(r, selector).ok())
        .map(|found| found.element)
}

/// Evaluates `condition` once across `roots`. A stale element counts as disabled.
pub fn evaluate_in(roots: &[&UIElement], condition: &WaitCondition) -> bool {
    let Some(selector) = condition.selector.as_ref() else {
        return condition.kind == WaitConditionKind::ElementNotExists;
    };
    match condition.kind {
        WaitConditionKind::ElementExists => locate_in(roots, selector).is_some(),
        WaitConditionKind::ElementNotExists => locate_in(roots, selector).is_none(),
        WaitConditionKind::ElementEnabled => locate_in(roots, selector)
            .map(|element| element.is_enabled().unwrap_or(false))
            .unwrap_or(false),
    }
}

/// Polls `selector` under a single root until `timeout_ms` elapses.
pub fn poll_find(
    root: &UIElement,
    selector: &ElementSelector,
    timeout_ms: u64,
) -> Result<Found, FinderFailure> {
    let mut last = None;
    let until = Instant::now() + Duration::from_millis(timeout_ms);
    poll_resolve(root, selector, until, &mut last).ok_or_else(|| last.unwrap_or_else(not_found))
}

fn not_found() -> FinderFailure {
    FinderFailure {
        kind: FinderFailureKind::NotFound,
        details: Default::default(),
        matched: 0,
    }
}

/// Selector defects cannot be fixed by waiting.
fn is_permanent(failure: Option<&FinderFailure>) -> bool {
    matches!(
        failure.map(|f| f.kind),
        Some(FinderFailureKind::InvalidSelector | FinderFailureKind::InvalidControlType)
    )
}

fn poll_resolve(
    root: &UIElement,
    selector: &ElementSelector,
    until: Instant,
    last: &mut Option<FinderFailure>,
) -> Option<Found> {
    loop {
        match finder::resolve(root, selector) {
            Ok(found) => return Some(found),
            Err(failure) => *last = Some(failure),
        }
        if is_permanent(last.as_ref()) {
            return None;
        }
        let now = Instant::now();
        if now >= until {
            return None;
        }
        thread::sleep(DEFAULT_POLL_INTERVAL.min(until - now));
    }
}

/// `GetMainWindow`: resolves the session's main window and the desktop.
pub fn acquire_roots(ctx: &mut FlowContext) -> Result<Roots, RpcError> {
    let step = OpenStep::new("GetMainWindow", "Get main window");
    let resolved = ctx
        .session()
        .main_window(ctx.timeout())
        .and_then(|main_window| Ok((main_window, ctx.session().desktop()?)));
    match resolved {
        Ok((main_window, desktop)) => {
            ctx.succeed(step);
            Ok(Roots {
                main_window,
                desktop,
            })
        }
        Err(e) => Err(ctx.fail(
            step,
            create_error(ErrorKind::ConfigError, "Failed to get main window", &e),
        )),
    }
}

/// `BringToForeground`: best effort, a refusal is only a warning.
pub fn bring_to_foreground(ctx: &mut FlowContext, main_window: &UIElement) {
    let step = OpenStep::new("BringToForeground", "Bring main window to foreground");
    match main_window.activate_window() {
        Ok(()) => ctx.succeed(step),
        Err(e) => ctx.warn(
            step,
            create_error(
                ErrorKind::ActionError,
                "Failed to bring window to foreground",
                &e,
            ),
        ),
    }
}

/// Polls `condition` as one logged step; timeout yields `TimeoutError`.
pub fn wait_step(
    ctx: &mut FlowContext,
    roots: &Roots,
    root: SearchRoot,
    step_id: &str,
    action: &str,
    condition: &WaitCondition,
    timeout_ms: u64,
) -> Result<(), RpcError> {
    let mut step = OpenStep::new(step_id, action).with_selector(condition.selector.as_ref());
    step.param("kind", condition.kind.as_str())
        .param("timeoutMs", timeout_ms);
    add_root_params(&mut step, root);

    let satisfied = waiter::poll_until(
        || roots.evaluate(root, condition),
        Duration::from_millis(timeout_ms),
        DEFAULT_POLL_INTERVAL,
    );
    if !satisfied {
        return Err(ctx.fail(
            step,
            RpcError::new(ErrorKind::TimeoutError, "WaitUntil timed out"),
        ));
    }
    ctx.succeed(step);
    Ok(())
}

/// Writes `text` into `element`. `Replace` goes through the value pattern
/// when the element has one; otherwise the element is focused, everything is
/// selected unless appending, and the text is typed.
pub fn set_text_on_element(
    engine: &dyn AccessibilityEngine,
    element: &UIElement,
    text: &str,
    mode: SetTextMode,
) -> Result<(), AutomationError> {
    if mode == SetTextMode::Replace && element.has_value_pattern() {
        return element.set_value(text);
    }
    element.focus()?;
    if mode != SetTextMode::Append {
        engine.select_all()?;
    }
    engine.type_text(text)
}

/// Lower-cases the first character of every object key, recursively, so
/// arguments written as `FilePath` or `filePath` land on the same field.
pub fn camel_case_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (lower_first(&k), camel_case_keys(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(camel_case_keys).collect()),
        other => other,
    }
}

fn lower_first(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Deserializes flow arguments; absent or null arguments are rejected.
pub fn parse_args<T: DeserializeOwned>(args: Option<&Value>) -> Result<T, RpcError> {
    let args = match args {
        None | Some(Value::Null) => return Err(RpcError::invalid_argument("Args must be provided")),
        Some(value) => value,
    };
    serde_json::from_value(camel_case_keys(args.clone())).map_err(|e| {
        RpcError::invalid_argument("Failed to parse args")
            .with_detail("exceptionType", "serde_json::Error")
            .with_detail("exceptionMessage", e.to_string())
    })
}

/// Positive values win; zero and negatives fall back to `default`.
pub fn positive_or(value: Option<i64>, default: u64) -> u64 {
    match value {
        Some(v) if v > 0 => v as u64,
        _ => default,
    }
}

/// Treats an empty path the same as an absent selector.
pub fn present(selector: Option<ElementSelector>) -> Option<ElementSelector> {
    selector.filter(|s| !s.is_empty())
}

/// Action of one scripted step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogAction {
    Click,
    DoubleClick,
    RightClick,
    SetText,
    SendKeys,
    WaitUntil,
}

impl DialogAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogAction::Click => "Click",
            DialogAction::DoubleClick => "DoubleClick",
            DialogAction::RightClick => "RightClick",
            DialogAction::SetText => "SetText",
            DialogAction::SendKeys => "SendKeys",
            DialogAction::WaitUntil => "WaitUntil",
        }
    }

    pub fn parse(value: Option<&str>) -> Option<Self> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        [
            DialogAction::Click,
            DialogAction::DoubleClick,
            DialogAction::RightClick,
            DialogAction::SetText,
            DialogAction::SendKeys,
            DialogAction::WaitUntil,
        ]
        .into_iter()
        .find(|a| a.as_str().eq_ignore_ascii_case(value))
    }
}

/// One scripted UI interaction used to open a dialog or an editor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DialogStep {
    pub action: Option<String>,
    pub selector: Option<ElementSelector>,
    pub text: Option<String>,
    pub mode: Option<String>,
    pub keys: Option<String>,
    pub condition: Option<WaitCondition>,
    pub timeout_ms: Option<i64>,
}

/// Naming of one family of scripted steps
#[derive(Debug, Clone, Copy)]
pub struct DialogScript {
    /// Step id of the first step; later ones get `.{n}` appended
    pub prefix: &'static str,
    pub action: &'static str,
    /// Argument name used in validation messages
    pub list_name: &'static str,
    pub failure_message: &'static str,
}

impl DialogScript {
    fn step_id(&self, index: usize) -> String {
        if index == 0 {
            self.prefix.to_string()
        } else {
            format!("{}.{}", self.prefix, index + 1)
        }
    }

    fn missing_action(&self) -> RpcError {
        RpcError::invalid_argument(format!("{} action must be provided", self.list_name))
    }

    /// Checks every step up front so a bad script fails before any UI is touched.
    pub fn validate(&self, steps: &[DialogStep]) -> Result<(), RpcError> {
        for step in steps {
            let action = DialogAction::parse(step.action.as_deref())
                .ok_or_else(|| self.missing_action())?;
            check_step_shape(action, step)?;
        }
        Ok(())
    }
}

fn check_step_shape(action: DialogAction, step: &DialogStep) -> Result<(), RpcError> {
    match action {
        DialogAction::SendKeys => {
            if step.keys.as_deref().map_or(true, |k| k.trim().is_empty()) {
                return Err(RpcError::invalid_argument("SendKeys action requires keys"));
            }
        }
        DialogAction::WaitUntil => {
            if step.condition.is_none() {
                return Err(RpcError::invalid_argument("WaitUntil action requires condition"));
            }
        }
        _ => {
            if step.selector.as_ref().map_or(true, ElementSelector::is_empty) {
                return Err(RpcError::invalid_argument("Selector must be provided for action"));
            }
        }
    }
    Ok(())
}

/// Budgets a scripted step falls back to when it has no `timeoutMs` of its own
#[derive(Debug, Clone, Copy)]
pub struct StepBudgets {
    pub find_timeout_ms: u64,
    pub wait_timeout_ms: u64,
}

/// Runs `steps` in order, one log entry each, stopping at the first failure.
pub fn run_dialog_steps(
    ctx: &mut FlowContext,
    roots: &Roots,
    root: SearchRoot,
    script: DialogScript,
    steps: &[DialogStep],
    budgets: StepBudgets,
) -> Result<(), RpcError> {
    for (index, step) in steps.iter().enumerate() {
        run_dialog_step(ctx, roots, root, script, step, index, budgets)?;
    }
    Ok(())
}

fn run_dialog_step(
    ctx: &mut FlowContext,
    roots: &Roots,
    root: SearchRoot,
    script: DialogScript,
    dialog: &DialogStep,
    index: usize,
    budgets: StepBudgets,
) -> Result<(), RpcError> {
    let action = DialogAction::parse(dialog.action.as_deref());
    let mut step = OpenStep::new(script.step_id(index), script.action)
        .with_selector(dialog.selector.as_ref())
        .with_param("action", action.map(|a| a.as_str()).unwrap_or(""));
    add_root_params(&mut step, root);

    let Some(action) = action else {
        return Err(ctx.fail(step, script.missing_action()));
    };
    if let Err(e) = check_step_shape(action, dialog) {
        return Err(ctx.fail(step, e));
    }

    let engine = ctx.engine();
    match action {
        DialogAction::SendKeys => {
            let raw = dialog.keys.as_deref().unwrap_or_default();
            step.param("keys", raw);
            let parsed = match keys::parse(raw) {
                Ok(parsed) => parsed,
                Err(e) => {
                    let error = RpcError::invalid_argument("Failed to parse keys")
                        .with_detail("error", e.to_string());
                    return Err(ctx.fail(step, error));
                }
            };
            if let Err(e) = engine.send_keys(&parsed) {
                return Err(ctx.fail(
                    step,
                    create_error(ErrorKind::ActionError, "SendKeys failed", &e),
                ));
            }
            ctx.succeed(step);
            Ok(())
        }
        DialogAction::WaitUntil => {
            let condition = dialog.condition.clone().unwrap_or_default();
            let timeout_ms = positive_or(dialog.timeout_ms, budgets.wait_timeout_ms);
            step.param("kind", condition.kind.as_str())
                .param("timeoutMs", timeout_ms);
            let satisfied = waiter::poll_until(
                || roots.evaluate(root, &condition),
                Duration::from_millis(timeout_ms),
                DEFAULT_POLL_INTERVAL,
            );
            if !satisfied {
                return Err(ctx.fail(
                    step,
                    RpcError::new(ErrorKind::TimeoutError, "WaitUntil timed out"),
                ));
            }
            ctx.succeed(step);
            Ok(())
        }
        DialogAction::Click
        | DialogAction::DoubleClick
        | DialogAction::RightClick
        | DialogAction::SetText => {
            let selector = dialog.selector.clone().unwrap_or_default();
            let timeout_ms = positive_or(dialog.timeout_ms, budgets.find_timeout_ms);
            let element = match roots.find_element(root, &selector, timeout_ms) {
                Ok(element) => element,
                Err(e) => return Err(ctx.fail(step, e)),
            };
            step.param("timeoutMs", timeout_ms);

            let outcome = match action {
                DialogAction::Click => element.click(),
                DialogAction::DoubleClick => element.double_click(),
                DialogAction::RightClick => element.right_click(),
                _ => {
                    let text = dialog.text.as_deref().unwrap_or_default();
                    // Unknown modes type at the caret without clearing.
                    let mode =
                        SetTextMode::parse(dialog.mode.as_deref()).unwrap_or(SetTextMode::Append);
                    step.param("textLength", text.chars().count())
                        .param("mode", mode.as_str());
                    if let Err(e) = set_text_on_element(engine.as_ref(), &element, text, mode) {
                        return Err(ctx.fail(
                            step,
                            create_error(ErrorKind::ActionError, "SetText failed", &e),
                        ));
                    }
                    Ok(())
                }
            };
            match outcome {
                Ok(()) => {
                    ctx.succeed(step);
                    Ok(())
                }
                Err(e) => Err(ctx.fail(
                    step,
                    create_error(ErrorKind::ActionError, script.failure_message, &e),
                )),
            }
        }
    }
}
