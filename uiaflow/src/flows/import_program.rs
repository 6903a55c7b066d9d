//! `autothink.importProgram.textPaste`: opens the program editor and delivers
//! program text through the clipboard, typing it instead when the clipboard
//! or the paste cannot be trusted.

use super::common::{
    acquire_roots, bring_to_foreground, parse_args, positive_or, present, run_dialog_steps,
    wait_step, DialogScript, DialogStep, Roots, SearchRoot, StepBudgets,
};
use super::popup::{handle_popup, PopupArgs, PopupOptions};
use super::{names, Flow, FlowContext, FlowOutcome};
use crate::clipboard::ClipboardFailureKind;
use crate::element::TextSource;
use crate::finder;
use crate::rpc::{create_error, map_find_failure, ErrorKind, RpcError};
use crate::selector::{ElementSelector, WaitCondition, WaitConditionKind};
use crate::step_log::{OpenStep, StepLogEntry};
use crate::waiter::{self, DEFAULT_POLL_INTERVAL};
use crate::UIElement;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_FIND_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_VERIFY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_AFTER_PASTE_WAIT_MS: u64 = 1_000;
pub const DEFAULT_TYPE_CHUNK_SIZE: usize = 128;
const MAX_REVERIFY_TIMEOUT_MS: u64 = 3_000;

/// Written and read back to probe the clipboard before the real payload
pub const CLIPBOARD_HEALTHCHECK_TEXT: &str = "CLIPBOARD_HEALTHCHECK";

const OPEN_PROGRAM_SCRIPT: DialogScript = DialogScript {
    prefix: "OpenProgramEntry",
    action: "Open program entry step",
    list_name: "OpenProgramSteps",
    failure_message: "Open program entry step failed",
};

/// How a paste is confirmed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyMode {
    None,
    EditorNotEmpty,
    ElementExists,
}

impl VerifyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyMode::None => "none",
            VerifyMode::EditorNotEmpty => "editorNotEmpty",
            VerifyMode::ElementExists => "elementExists",
        }
    }

    /// Case-insensitive; blank means `editorNotEmpty`.
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value.map(str::trim) {
            None | Some("") => Some(VerifyMode::EditorNotEmpty),
            Some(v) => [
                VerifyMode::None,
                VerifyMode::EditorNotEmpty,
                VerifyMode::ElementExists,
            ]
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(v)),
        }
    }
}

/// Bounded retry for clipboard writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClipboardRetry {
    pub times: i64,
    pub interval_ms: i64,
}

impl Default for ClipboardRetry {
    fn default() -> Self {
        Self {
            times: 3,
            interval_ms: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportProgramArgs {
    pub program_text: String,
    pub open_program_steps: Vec<DialogStep>,
    pub editor_root_selector: Option<ElementSelector>,
    pub editor_selector: Option<ElementSelector>,
    pub after_paste_wait_ms: Option<i64>,
    pub verify_mode: Option<String>,
    pub verify_selector: Option<ElementSelector>,
    pub search_root: Option<String>,
    pub find_timeout_ms: Option<i64>,
    pub clipboard_timeout_ms: Option<i64>,
    pub verify_timeout_ms: Option<i64>,
    pub fallback_to_type: bool,
    pub prefer_clipboard: bool,
    pub clipboard_retry: Option<ClipboardRetry>,
    pub clipboard_health_check: bool,
    pub force_fallback_on_clipboard_failure: bool,
    pub type_chunk_size: Option<i64>,
    pub type_chunk_delay_ms: Option<i64>,
    #[serde(flatten)]
    pub popup: PopupArgs,
}

impl Default for ImportProgramArgs {
    fn default() -> Self {
        Self {
            program_text: String::new(),
            open_program_steps: Vec::new(),
            editor_root_selector: None,
            editor_selector: None,
            after_paste_wait_ms: None,
            verify_mode: None,
            verify_selector: None,
            search_root: None,
            find_timeout_ms: None,
            clipboard_timeout_ms: None,
            verify_timeout_ms: None,
            fallback_to_type: true,
            prefer_clipboard: true,
            clipboard_retry: None,
            clipboard_health_check: false,
            force_fallback_on_clipboard_failure: false,
            type_chunk_size: None,
            type_chunk_delay_ms: None,
            popup: PopupArgs::default(),
        }
    }
}

/// Validated arguments with defaults applied
#[derive(Debug, Clone)]
pub struct ImportProgramPlan {
    pub program_text: String,
    pub open_steps: Vec<DialogStep>,
    pub editor_root: Option<ElementSelector>,
    pub editor: ElementSelector,
    pub after_paste_wait_ms: u64,
    pub verify_mode: VerifyMode,
    pub verify_selector: Option<ElementSelector>,
    pub search_root: SearchRoot,
    pub find_timeout_ms: u64,
    pub verify_timeout_ms: u64,
    pub fallback_to_type: bool,
    pub prefer_clipboard: bool,
    pub retry: ClipboardRetry,
    pub clipboard_health_check: bool,
    pub force_fallback_on_clipboard_failure: bool,
    pub type_chunk_size: usize,
    pub type_chunk_delay_ms: u64,
    pub popup: Option<PopupOptions>,
}

impl ImportProgramPlan {
    pub fn from_args(args: Option<&Value>) -> Result<Self, RpcError> {
        let raw: ImportProgramArgs = parse_args(args)?;

        if raw.program_text.trim().is_empty() {
            return Err(RpcError::invalid_argument("ProgramText must be provided"));
        }
        let editor = present(raw.editor_selector)
            .ok_or_else(|| RpcError::invalid_argument("EditorSelector must be provided"))?;
        if raw.editor_root_selector.as_ref().is_some_and(ElementSelector::is_empty) {
            return Err(RpcError::invalid_argument("EditorRootSelector is invalid"));
        }
        OPEN_PROGRAM_SCRIPT.validate(&raw.open_program_steps)?;

        let after_paste_wait_ms = match raw.after_paste_wait_ms {
            None => DEFAULT_AFTER_PASTE_WAIT_MS,
            Some(ms) if ms < 0 => {
                return Err(RpcError::invalid_argument("AfterPasteWaitMs must be >= 0"))
            }
            Some(ms) => ms as u64,
        };

        let verify_mode = VerifyMode::parse(raw.verify_mode.as_deref()).ok_or_else(|| {
            RpcError::invalid_argument("VerifyMode must be none/editorNotEmpty/elementExists")
        })?;
        let verify_selector = present(raw.verify_selector);
        if verify_mode == VerifyMode::ElementExists && verify_selector.is_none() {
            return Err(RpcError::invalid_argument(
                "VerifySelector must be provided when VerifyMode=elementExists",
            ));
        }

        let search_root = SearchRoot::parse(raw.search_root.as_deref(), SearchRoot::MainWindow)
            .ok_or_else(|| RpcError::invalid_argument("SearchRoot must be mainWindow/desktop"))?;
        let popup = raw.popup.into_options()?;

        let retry = raw.clipboard_retry.unwrap_or_default();
        if retry.times <= 0 {
            return Err(RpcError::invalid_argument("ClipboardRetry.Times must be >= 1"));
        }
        if retry.interval_ms < 0 {
            return Err(RpcError::invalid_argument("ClipboardRetry.IntervalMs must be >= 0"));
        }

        if !raw.prefer_clipboard && !raw.fallback_to_type {
            return Err(RpcError::invalid_argument(
                "preferClipboard=false requires fallbackToType=true",
            ));
        }

        Ok(Self {
            program_text: raw.program_text,
            open_steps: raw.open_program_steps,
            editor_root: raw.editor_root_selector,
            editor,
            after_paste_wait_ms,
            verify_mode,
            verify_selector,
            search_root,
            find_timeout_ms: positive_or(raw.find_timeout_ms, DEFAULT_FIND_TIMEOUT_MS),
            verify_timeout_ms: positive_or(raw.verify_timeout_ms, DEFAULT_VERIFY_TIMEOUT_MS),
            fallback_to_type: raw.fallback_to_type,
            prefer_clipboard: raw.prefer_clipboard,
            retry,
            clipboard_health_check: raw.clipboard_health_check,
            force_fallback_on_clipboard_failure: raw.force_fallback_on_clipboard_failure,
            type_chunk_size: positive_or(raw.type_chunk_size, DEFAULT_TYPE_CHUNK_SIZE as u64)
                as usize,
            type_chunk_delay_ms: raw.type_chunk_delay_ms.unwrap_or(0).max(0) as u64,
            popup,
        })
    }
}

pub struct ImportProgramTextPasteFlow;

impl Flow for ImportProgramTextPasteFlow {
    fn name(&self) -> &str {
        names::IMPORT_PROGRAM_TEXT_PASTE
    }

    fn run(&self, ctx: &mut FlowContext, args: Option<&Value>) -> FlowOutcome {
        let validate = OpenStep::new("ValidateArgs", "Validate args");
        let plan = match ImportProgramPlan::from_args(args) {
            Ok(plan) => plan,
            Err(e) => return Err(ctx.fail(validate, e).into()),
        };
        ctx.succeed(validate);

        let roots = acquire_roots(ctx)?;
        bring_to_foreground(ctx, &roots.main_window);
        let popup = plan.popup.as_ref();

        handle_popup(ctx, &roots, popup, "BeforePaste");
        open_program_entry(ctx, &roots, &plan)?;

        if let Some(editor_root) = &plan.editor_root {
            wait_step(
                ctx,
                &roots,
                plan.search_root,
                "WaitEditorRoot",
                "Wait editor root",
                &WaitCondition::new(WaitConditionKind::ElementExists, editor_root.clone()),
                plan.find_timeout_ms,
            )?;
        }

        let editor = find_editor(ctx, &roots, &plan)?;
        focus_editor(ctx, &editor, &plan)?;

        let mut fallback_used = deliver_text(ctx, &plan)?;

        if plan.after_paste_wait_ms > 0 {
            let step = OpenStep::new("WaitAfterPaste", "Wait after paste")
                .with_param("waitMs", plan.after_paste_wait_ms)
                .with_param("method", if fallback_used { "fallback" } else { "ctrlV" });
            thread::sleep(Duration::from_millis(plan.after_paste_wait_ms));
            ctx.succeed(step);
        }

        handle_popup(ctx, &roots, popup, "AfterPaste");

        let first = verify_paste(
            ctx,
            &roots,
            &editor,
            &plan,
            plan.verify_timeout_ms,
            ("VerifyPaste", "Verify paste result"),
            plan.fallback_to_type && !fallback_used,
        );
        if let Err(error) = first {
            if !plan.fallback_to_type || fallback_used || plan.verify_mode == VerifyMode::None {
                return Err(error.into());
            }
            warn!("paste not verified, typing program text instead");
            type_fallback(ctx, &plan)?;
            fallback_used = true;

            if plan.after_paste_wait_ms > 0 {
                let step = OpenStep::new("WaitAfterFallback", "Wait after fallback typing")
                    .with_param("waitMs", plan.after_paste_wait_ms);
                thread::sleep(Duration::from_millis(plan.after_paste_wait_ms));
                ctx.succeed(step);
            }

            handle_popup(ctx, &roots, popup, "AfterFallback");

            verify_paste(
                ctx,
                &roots,
                &editor,
                &plan,
                plan.verify_timeout_ms.min(MAX_REVERIFY_TIMEOUT_MS),
                ("VerifyPasteAfterFallback", "Verify paste after fallback"),
                false,
            )?;
        }

        info!(
            "program text delivered ({} chars, fallback: {})",
            plan.program_text.chars().count(),
            fallback_used
        );
        Ok(json!({
            "textLength": plan.program_text.chars().count(),
            "fallbackUsed": fallback_used,
            "verifyMode": plan.verify_mode.as_str(),
            "preferClipboard": plan.prefer_clipboard,
        }))
    }
}

fn open_program_entry(
    ctx: &mut FlowContext,
    roots: &Roots,
    plan: &ImportProgramPlan,
) -> Result<(), RpcError> {
    if plan.open_steps.is_empty() {
        let skipped = OpenStep::new("OpenProgramEntry", "Open program entry (skipped)")
            .with_param("skipped", "true");
        ctx.succeed(skipped);
        return Ok(());
    }
    run_dialog_steps(
        ctx,
        roots,
        plan.search_root,
        OPEN_PROGRAM_SCRIPT,
        &plan.open_steps,
        StepBudgets {
            find_timeout_ms: plan.find_timeout_ms,
            wait_timeout_ms: plan.verify_timeout_ms,
        },
    )
}

fn find_editor(
    ctx: &mut FlowContext,
    roots: &Roots,
    plan: &ImportProgramPlan,
) -> Result<UIElement, RpcError> {
    let step = OpenStep::new("FindEditor", "Find editor element")
        .with_selector(Some(&plan.editor))
        .with_param("timeoutMs", plan.find_timeout_ms)
        .with_param("root", plan.search_root.as_str());

    let root = roots.get(plan.search_root);
    let mut last = None;
    let mut editor = None;
    waiter::poll_until(
        || match finder::resolve(root, &plan.editor) {
            Ok(found) => {
                editor = Some(found.element);
                true
            }
            Err(failure) => {
                last = Some(failure);
                false
            }
        },
        Duration::from_millis(plan.find_timeout_ms),
        DEFAULT_POLL_INTERVAL,
    );

    match editor {
        Some(editor) => {
            ctx.succeed(step);
            Ok(editor)
        }
        None => {
            let error = last
                .map(|failure| map_find_failure(&failure))
                .unwrap_or_else(|| RpcError::new(ErrorKind::FindError, "Element not found"));
            Err(ctx.fail(step, error))
        }
    }
}

fn focus_editor(
    ctx: &mut FlowContext,
    editor: &UIElement,
    plan: &ImportProgramPlan,
) -> Result<(), RpcError> {
    let step = OpenStep::new("FocusEditor", "Focus editor").with_selector(Some(&plan.editor));
    match editor.focus() {
        Ok(()) => {
            ctx.succeed(step);
            Ok(())
        }
        Err(e) => Err(ctx.fail(
            step,
            create_error(ErrorKind::ActionError, "Failed to focus editor", &e),
        )),
    }
}

/// Pastes or types the program text. Returns whether typing was used.
fn deliver_text(ctx: &mut FlowContext, plan: &ImportProgramPlan) -> Result<bool, RpcError> {
    let mut prefer_clipboard = plan.prefer_clipboard;

    if prefer_clipboard && plan.clipboard_health_check {
        let health = set_clipboard_with_retry(
            ctx,
            "ClipboardHealthCheck",
            "Clipboard health check",
            CLIPBOARD_HEALTHCHECK_TEXT,
            plan.retry,
            true,
        );
        if !health.ok && plan.force_fallback_on_clipboard_failure {
            debug!("clipboard health check failed, skipping paste");
            prefer_clipboard = false;
        }
    }

    if !prefer_clipboard {
        let step = OpenStep::new("SendKeysPaste", "SendKeys CTRL+V");
        ctx.warn(
            step,
            RpcError::new(ErrorKind::ActionError, "CTRL+V skipped (preferClipboard=false)"),
        );
        type_fallback(ctx, plan)?;
        return Ok(true);
    }

    let written = set_clipboard_with_retry(
        ctx,
        "SetClipboardText",
        "SetClipboardText",
        &plan.program_text,
        plan.retry,
        plan.fallback_to_type,
    );
    if !written.ok {
        let error = written
            .error
            .unwrap_or_else(|| RpcError::new(ErrorKind::ActionError, "Clipboard set failed"));
        if !plan.fallback_to_type {
            return Err(error);
        }
        let step = OpenStep::new("SendKeysPaste", "SendKeys CTRL+V");
        ctx.warn(
            step,
            RpcError::new(ErrorKind::ActionError, "Clipboard unavailable; skipped CTRL+V"),
        );
        type_fallback(ctx, plan)?;
        return Ok(true);
    }

    let step = OpenStep::new("SendKeysPaste", "SendKeys CTRL+V");
    match ctx.engine().paste() {
        Ok(()) => {
            ctx.succeed(step);
            Ok(false)
        }
        Err(e) if plan.fallback_to_type => {
            ctx.warn(
                step,
                create_error(
                    ErrorKind::ActionError,
                    "CTRL+V paste failed, will fallback to typing",
                    &e,
                ),
            );
            type_fallback(ctx, plan)?;
            Ok(true)
        }
        Err(e) => Err(ctx.fail(
            step,
            create_error(ErrorKind::ActionError, "CTRL+V paste failed", &e),
        )),
    }
}

/// `FallbackTypeText`: types the program in chunks with an optional pause.
fn type_fallback(ctx: &mut FlowContext, plan: &ImportProgramPlan) -> Result<(), RpcError> {
    let text = &plan.program_text;
    let step = OpenStep::new("FallbackTypeText", "Fallback type text")
        .with_param("chunkSize", plan.type_chunk_size)
        .with_param("chunkDelayMs", plan.type_chunk_delay_ms)
        .with_param("textLength", text.chars().count());

    let engine = ctx.engine();
    let chars: Vec<char> = text.chars().collect();
    for chunk in chars.chunks(plan.type_chunk_size.max(1)) {
        let chunk: String = chunk.iter().collect();
        if let Err(e) = engine.type_text(&chunk) {
            return Err(ctx.fail(
                step,
                create_error(ErrorKind::ActionError, "Fallback typing failed", &e),
            ));
        }
        if plan.type_chunk_delay_ms > 0 {
            thread::sleep(Duration::from_millis(plan.type_chunk_delay_ms));
        }
    }
    ctx.succeed(step);
    Ok(())
}

fn verify_paste(
    ctx: &mut FlowContext,
    roots: &Roots,
    editor: &UIElement,
    plan: &ImportProgramPlan,
    timeout_ms: u64,
    (step_id, action): (&str, &str),
    warn_on_failure: bool,
) -> Result<(), RpcError> {
    let logged_selector = match plan.verify_mode {
        VerifyMode::ElementExists => plan.verify_selector.as_ref(),
        _ => Some(&plan.editor),
    };
    let mut step = OpenStep::new(step_id, action)
        .with_selector(logged_selector)
        .with_param("mode", plan.verify_mode.as_str())
        .with_param("timeoutMs", timeout_ms)
        .with_param("root", plan.search_root.as_str());

    if plan.verify_mode == VerifyMode::None {
        ctx.succeed(step);
        return Ok(());
    }

    let root = roots.get(plan.search_root);
    let mut source: Option<&'static str> = None;
    let verified = waiter::poll_until(
        || match plan.verify_mode {
            VerifyMode::ElementExists => plan
                .verify_selector
                .as_ref()
                .is_some_and(|s| finder::exists(root, s)),
            _ => {
                let target = finder::resolve(root, &plan.editor)
                    .map(|found| found.element)
                    .unwrap_or_else(|_| editor.clone());
                editor_has_text(&target, &mut source)
            }
        },
        Duration::from_millis(timeout_ms),
        DEFAULT_POLL_INTERVAL,
    );

    if !verified {
        let error = RpcError::new(ErrorKind::TimeoutError, "Paste verification timed out");
        ctx.push(step.fail_or_warn(error.clone(), warn_on_failure));
        return Err(error);
    }
    if let Some(source) = source {
        step.param("verification", source);
    }
    ctx.succeed(step);
    Ok(())
}

/// Disabled editors never verify. An editor whose text cannot be read is
/// accepted on the strength of being enabled.
fn editor_has_text(editor: &UIElement, source: &mut Option<&'static str>) -> bool {
    if !editor.is_enabled().unwrap_or(false) {
        return false;
    }
    for (text_source, label) in [
        (TextSource::Value, "ValuePattern"),
        (TextSource::Text, "TextPattern"),
    ] {
        if let Ok(Some(text)) = editor.read_text(text_source) {
            *source = Some(label);
            return !text.is_empty();
        }
    }
    *source = Some("EnabledOnly");
    true
}

/// Result of a retried clipboard write
#[derive(Debug, Clone, PartialEq)]
pub struct ClipboardOutcome {
    pub ok: bool,
    pub attempts: u32,
    pub failure_kind: Option<ClipboardFailureKind>,
    pub failure_message: Option<String>,
    pub error: Option<RpcError>,
}

/// Writes `text` to the clipboard up to `retry.times` times. Logs a summary
/// step `step_id` followed by one `{step_id}.Attempt{n}` entry per attempt.
/// Failed attempts before the last are warnings; the last one, and the
/// summary, fail unless `warn_on_failure` is set.
pub fn set_clipboard_with_retry(
    ctx: &mut FlowContext,
    step_id: &str,
    action: &str,
    text: &str,
    retry: ClipboardRetry,
    warn_on_failure: bool,
) -> ClipboardOutcome {
    let attempts = retry.times.max(1) as u32;
    let interval_ms = retry.interval_ms.max(0) as u64;
    let text_length = text.chars().count();

    let mut summary = OpenStep::new(step_id, action)
        .with_param("attempts", attempts)
        .with_param("intervalMs", interval_ms)
        .with_param("textLength", text_length);

    let engine = ctx.engine();
    let mut entries: Vec<StepLogEntry> = Vec::with_capacity(attempts as usize);
    let mut last_error = None;
    let mut last_kind = None;
    let mut last_message = None;

    for i in 1..=attempts {
        let mut attempt_step = OpenStep::new(format!("{step_id}.Attempt{i}"), action)
            .with_param("attempt", i)
            .with_param("maxAttempts", attempts)
            .with_param("intervalMs", interval_ms)
            .with_param("textLength", text_length);

        let attempt = engine.set_clipboard_text(text);
        if attempt.ok {
            entries.push(attempt_step.success());
            ctx.succeed(summary);
            for entry in entries {
                ctx.push(entry);
            }
            return ClipboardOutcome {
                ok: true,
                attempts: i,
                failure_kind: None,
                failure_message: None,
                error: None,
            };
        }

        let kind_str = attempt.failure_kind.map(|k| k.as_str()).unwrap_or_default();
        attempt_step.param("failureKind", kind_str);
        if let Some(message) = attempt.message.as_deref().filter(|m| !m.trim().is_empty()) {
            attempt_step.param("message", message);
        }

        let error = RpcError::new(
            ErrorKind::ActionError,
            format!("Clipboard set failed ({kind_str})"),
        )
        .with_detail("failureKind", kind_str)
        .with_detail("message", attempt.message.clone().unwrap_or_default())
        .with_detail("exceptionType", attempt.exception_type.clone().unwrap_or_default());

        let is_final = i == attempts;
        entries.push(attempt_step.fail_or_warn(error.clone(), warn_on_failure || !is_final));
        debug!("clipboard attempt {}/{} failed: {}", i, attempts, kind_str);

        last_error = Some(error);
        last_kind = attempt.failure_kind;
        last_message = attempt.message;

        if !is_final && interval_ms > 0 {
            thread::sleep(Duration::from_millis(interval_ms));
        }
    }

    if let Some(kind) = last_kind {
        summary.param("failureKind", kind.as_str());
    }
    let summary_error = last_error
        .clone()
        .unwrap_or_else(|| RpcError::new(ErrorKind::ActionError, "Clipboard set failed"));
    ctx.push(summary.fail_or_warn(summary_error, warn_on_failure));
    for entry in entries {
        ctx.push(entry);
    }

    ClipboardOutcome {
        ok: false,
        attempts,
        failure_kind: last_kind,
        failure_message: last_message,
        error: last_error,
    }
}
