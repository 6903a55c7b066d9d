//! `autothink.build`: clicks the build trigger, waits for completion while
//! watching for unexpected dialogs, then decides whether the build passed.

use super::common::{
    acquire_roots, add_root_params, parse_args, positive_or, present, Roots, SearchRoot,
};
use super::popup::{handle_popup, PopupArgs, PopupOptions};
use super::{names, Flow, FlowContext, FlowFailure, FlowOutcome};
use crate::element::TextSource;
use crate::rpc::{create_error, ErrorKind, RpcError};
use crate::selector::{ElementSelector, WaitCondition};
use crate::step_log::OpenStep;
use crate::waiter::{self, DEFAULT_POLL_INTERVAL};
use crate::UIElement;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DEFAULT_FIND_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 60_000;
/// Longest text sample kept in logs and response data
pub const MAX_TEXT_SAMPLE_CHARS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeMode {
    WaitSelector,
    ReadTextContains,
    Either,
}

impl OutcomeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeMode::WaitSelector => "waitSelector",
            OutcomeMode::ReadTextContains => "readTextContains",
            OutcomeMode::Either => "either",
        }
    }

    /// Case-insensitive; blank means `waitSelector`.
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value.map(str::trim) {
            None | Some("") => Some(OutcomeMode::WaitSelector),
            Some(v) => [
                OutcomeMode::WaitSelector,
                OutcomeMode::ReadTextContains,
                OutcomeMode::Either,
            ]
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(v)),
        }
    }

    fn checks_selectors(&self) -> bool {
        matches!(self, OutcomeMode::WaitSelector | OutcomeMode::Either)
    }

    fn checks_text(&self) -> bool {
        matches!(self, OutcomeMode::ReadTextContains | OutcomeMode::Either)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildVerdict {
    Success,
    Fail,
    #[default]
    Unknown,
}

impl BuildVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildVerdict::Success => "Success",
            BuildVerdict::Fail => "Fail",
            BuildVerdict::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildOutcomeArgs {
    pub mode: Option<String>,
    pub success_selector: Option<ElementSelector>,
    pub failure_selector: Option<ElementSelector>,
    pub text_probe_selector: Option<ElementSelector>,
    pub success_text_contains: Vec<String>,
    pub timeout_ms: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildArgs {
    pub build_button_selector: Option<ElementSelector>,
    pub build_trigger_selector: Option<ElementSelector>,
    pub wait_condition: Option<WaitCondition>,
    pub completed_condition: Option<WaitCondition>,
    pub build_outcome: Option<BuildOutcomeArgs>,
    pub timeout_ms: Option<i64>,
    pub wait_timeout_ms: Option<i64>,
    pub find_timeout_ms: Option<i64>,
    pub search_root: Option<String>,
    pub optional_close_dialog_selector: Option<ElementSelector>,
    pub unexpected_selectors: Vec<ElementSelector>,
    #[serde(flatten)]
    pub popup: PopupArgs,
}

/// How the flow decides the build result
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRules {
    pub mode: OutcomeMode,
    pub success: Option<ElementSelector>,
    pub failure: Option<ElementSelector>,
    pub text_probe: Option<ElementSelector>,
    pub tokens: Vec<String>,
    pub timeout_ms: u64,
}

impl OutcomeRules {
    /// Selector logged on the `BuildOutcome` step
    fn primary_selector(&self) -> Option<&ElementSelector> {
        self.success
            .as_ref()
            .or(self.text_probe.as_ref())
            .or(self.failure.as_ref())
    }
}

#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub trigger: ElementSelector,
    pub wait: WaitCondition,
    pub unexpected: Vec<ElementSelector>,
    pub close_dialog: Option<ElementSelector>,
    pub find_timeout_ms: u64,
    pub wait_timeout_ms: u64,
    pub search_root: SearchRoot,
    pub popup: Option<PopupOptions>,
    pub outcome: OutcomeRules,
}

impl BuildPlan {
    pub fn from_args(args: Option<&Value>) -> Result<Self, RpcError> {
        let raw: BuildArgs = parse_args(args)?;

        let trigger = present(raw.build_button_selector.or(raw.build_trigger_selector))
            .ok_or_else(|| RpcError::invalid_argument("BuildButtonSelector must be provided"))?;
        let wait = raw
            .wait_condition
            .or(raw.completed_condition)
            .ok_or_else(|| RpcError::invalid_argument("WaitCondition must be provided"))?;
        let wait_selector = present(wait.selector.clone()).ok_or_else(|| {
            RpcError::invalid_argument("WaitCondition selector must be provided")
        })?;

        let find_timeout_ms = positive_or(raw.find_timeout_ms, DEFAULT_FIND_TIMEOUT_MS);
        let wait_timeout_ms = positive_or(
            raw.timeout_ms,
            positive_or(raw.wait_timeout_ms, DEFAULT_WAIT_TIMEOUT_MS),
        );

        let search_root = SearchRoot::parse(raw.search_root.as_deref(), SearchRoot::MainWindow)
            .ok_or_else(|| RpcError::invalid_argument("SearchRoot must be mainWindow/desktop"))?;
        let popup = raw.popup.into_options()?;

        let outcome = match raw.build_outcome {
            None => OutcomeRules {
                mode: OutcomeMode::WaitSelector,
                success: Some(wait_selector),
                failure: None,
                text_probe: None,
                tokens: Vec::new(),
                timeout_ms: wait_timeout_ms,
            },
            Some(args) => outcome_rules(args, wait_timeout_ms)?,
        };

        Ok(Self {
            trigger,
            wait,
            unexpected: raw.unexpected_selectors,
            close_dialog: present(raw.optional_close_dialog_selector),
            find_timeout_ms,
            wait_timeout_ms,
            search_root,
            popup,
            outcome,
        })
    }
}

fn outcome_rules(args: BuildOutcomeArgs, wait_timeout_ms: u64) -> Result<OutcomeRules, RpcError> {
    let mode = OutcomeMode::parse(args.mode.as_deref()).ok_or_else(|| {
        RpcError::invalid_argument("BuildOutcome.Mode must be waitSelector/readTextContains/either")
    })?;
    let rules = OutcomeRules {
        mode,
        success: present(args.success_selector),
        failure: present(args.failure_selector),
        text_probe: present(args.text_probe_selector),
        tokens: distinct_tokens(args.success_text_contains),
        timeout_ms: positive_or(args.timeout_ms, wait_timeout_ms),
    };

    let has_selector = rules.success.is_some() || rules.failure.is_some();
    let has_text = rules.text_probe.is_some() && !rules.tokens.is_empty();
    match mode {
        OutcomeMode::WaitSelector if !has_selector => Err(RpcError::invalid_argument(
            "BuildOutcome requires successSelector or failureSelector for waitSelector mode",
        )),
        OutcomeMode::ReadTextContains if rules.text_probe.is_none() => Err(
            RpcError::invalid_argument(
                "BuildOutcome.TextProbeSelector is required for readTextContains mode",
            ),
        ),
        OutcomeMode::ReadTextContains if rules.tokens.is_empty() => Err(
            RpcError::invalid_argument(
                "BuildOutcome.SuccessTextContains is required for readTextContains mode",
            ),
        ),
        OutcomeMode::Either if !has_selector && !has_text => Err(RpcError::invalid_argument(
            "BuildOutcome requires selector or text probe configuration for either mode",
        )),
        _ => Ok(rules),
    }
}

/// Trimmed, non-blank tokens with case-insensitive duplicates removed
fn distinct_tokens(tokens: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for token in tokens {
        let token = token.trim();
        if token.is_empty() || out.iter().any(|t| t.eq_ignore_ascii_case(token)) {
            continue;
        }
        out.push(token.to_string());
    }
    out
}

/// What the outcome evaluation observed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutcomeEvidence {
    pub verdict: BuildVerdict,
    pub success_hit: Option<bool>,
    pub failure_hit: Option<bool>,
    pub text_probed: bool,
    pub last_text_sample: Option<String>,
    pub matched_token: Option<String>,
    pub text_source: Option<TextSource>,
}

pub struct BuildFlow;

impl Flow for BuildFlow {
    fn name(&self) -> &str {
        names::BUILD
    }

    fn run(&self, ctx: &mut FlowContext, args: Option<&Value>) -> FlowOutcome {
        let validate = OpenStep::new("ValidateArgs", "Validate args");
        let plan = match BuildPlan::from_args(args) {
            Ok(plan) => plan,
            Err(e) => return Err(ctx.fail(validate, e).into()),
        };
        ctx.succeed(validate);

        let roots = acquire_roots(ctx)?;
        let popup = plan.popup.as_ref();

        handle_popup(ctx, &roots, popup, "BeforeBuild");
        let trigger = find_trigger(ctx, &roots, &plan)?;

        let click = OpenStep::new("ClickBuild", "Click build button").with_selector(Some(&plan.trigger));
        if let Err(e) = trigger.click() {
            return Err(ctx
                .fail(
                    click,
                    create_error(ErrorKind::ActionError, "Failed to click build trigger", &e),
                )
                .into());
        }
        ctx.succeed(click);

        handle_popup(ctx, &roots, popup, "AfterClickBuild");
        wait_build_done(ctx, &roots, &plan)?;
        handle_popup(ctx, &roots, popup, "AfterBuildDone");

        let mut step = OpenStep::new("BuildOutcome", "Evaluate build outcome")
            .with_selector(plan.outcome.primary_selector())
            .with_param("mode", plan.outcome.mode.as_str())
            .with_param("timeoutMs", plan.outcome.timeout_ms);
        add_root_params(&mut step, plan.search_root);

        let evidence = evaluate_outcome(&roots, plan.search_root, &plan.outcome);
        record_evidence(&mut step, &evidence);

        let outcome_error = match evidence.verdict {
            BuildVerdict::Success => {
                ctx.succeed(step);
                None
            }
            BuildVerdict::Fail => Some(ctx.fail(
                step,
                RpcError::new(
                    ErrorKind::UnexpectedUIState,
                    "Build failed (failure selector matched)",
                ),
            )),
            BuildVerdict::Unknown => Some(ctx.fail(
                step,
                RpcError::new(ErrorKind::TimeoutError, "Build outcome unknown"),
            )),
        };
        let data = response_data(ctx, &plan, &evidence);

        if let Some(selector) = &plan.close_dialog {
            close_dialog(ctx, &roots, &plan, selector);
        }

        match outcome_error {
            None => {
                info!("build succeeded");
                Ok(data)
            }
            Some(error) => {
                warn!("build did not succeed: {}", evidence.verdict.as_str());
                Err(FlowFailure::with_data(error, data))
            }
        }
    }
}

fn find_trigger(ctx: &mut FlowContext, roots: &Roots, plan: &BuildPlan) -> Result<UIElement, RpcError> {
    let mut step = OpenStep::new("FindBuildButton", "Find build button")
        .with_selector(Some(&plan.trigger))
        .with_param("timeoutMs", plan.find_timeout_ms);
    add_root_params(&mut step, plan.search_root);

    match roots.find_element(plan.search_root, &plan.trigger, plan.find_timeout_ms) {
        Ok(element) => {
            ctx.succeed(step);
            Ok(element)
        }
        Err(e) => Err(ctx.fail(step, e)),
    }
}

/// Polls the completion condition; a match on any unexpected selector ends
/// the wait immediately with `UnexpectedUIState`.
fn wait_build_done(ctx: &mut FlowContext, roots: &Roots, plan: &BuildPlan) -> Result<(), RpcError> {
    let mut step = OpenStep::new("WaitBuildDone", "Wait build done")
        .with_selector(plan.wait.selector.as_ref())
        .with_param("kind", plan.wait.kind.as_str())
        .with_param("timeoutMs", plan.wait_timeout_ms);
    add_root_params(&mut step, plan.search_root);
    if !plan.unexpected.is_empty() {
        step.param("unexpectedSelectors", plan.unexpected.len());
    }

    let watched: Vec<(usize, &ElementSelector)> = plan
        .unexpected
        .iter()
        .enumerate()
        .filter(|(_, s)| !s.is_empty())
        .collect();

    let waited = waiter::try_poll_until(
        || {
            if let Some((index, _)) = watched
                .iter()
                .find(|(_, s)| roots.locate(plan.search_root, s).is_some())
            {
                return Err(RpcError::new(
                    ErrorKind::UnexpectedUIState,
                    "Unexpected UI state detected during build",
                )
                .with_detail("selectorHint", "unexpectedSelectorMatched")
                .with_detail("selectorIndex", index.to_string()));
            }
            Ok(roots.evaluate(plan.search_root, &plan.wait))
        },
        Duration::from_millis(plan.wait_timeout_ms),
        DEFAULT_POLL_INTERVAL,
    );

    match waited {
        Ok(true) => {
            ctx.succeed(step);
            Ok(())
        }
        Ok(false) => Err(ctx.fail(
            step,
            RpcError::new(ErrorKind::TimeoutError, "Build wait timed out"),
        )),
        Err(unexpected) => Err(ctx.fail(step, unexpected)),
    }
}

/// Polls until a verdict is reached or `rules.timeout_ms` runs out. Each
/// round checks the failure selector first, so a failure visible at the same
/// time as success wins.
pub fn evaluate_outcome(roots: &Roots, root: SearchRoot, rules: &OutcomeRules) -> OutcomeEvidence {
    let mut evidence = OutcomeEvidence {
        success_hit: rules.success.as_ref().map(|_| false),
        failure_hit: rules.failure.as_ref().map(|_| false),
        ..Default::default()
    };
    let deadline = Instant::now() + Duration::from_millis(rules.timeout_ms);

    loop {
        if let Some(failure) = &rules.failure {
            if roots.locate(root, failure).is_some() {
                evidence.failure_hit = Some(true);
                evidence.verdict = BuildVerdict::Fail;
                return evidence;
            }
        }

        if rules.mode.checks_selectors() {
            if let Some(success) = &rules.success {
                if roots.locate(root, success).is_some() {
                    evidence.success_hit = Some(true);
                    evidence.verdict = BuildVerdict::Success;
                    return evidence;
                }
            }
        }

        if rules.mode.checks_text() {
            if let Some(element) = rules.text_probe.as_ref().and_then(|s| roots.locate(root, s)) {
                evidence.text_probed = true;
                if let Some((text, source)) = read_probe_text(&element) {
                    evidence.last_text_sample = Some(truncate_chars(&text, MAX_TEXT_SAMPLE_CHARS));
                    evidence.text_source = Some(source);
                    if let Some(token) = match_token(&text, &rules.tokens) {
                        evidence.matched_token = Some(token.to_string());
                        evidence.verdict = BuildVerdict::Success;
                        return evidence;
                    }
                }
            }
        }

        let now = Instant::now();
        if now >= deadline {
            evidence.verdict = BuildVerdict::Unknown;
            return evidence;
        }
        thread::sleep(DEFAULT_POLL_INTERVAL.min(deadline - now));
    }
}

/// First readable source in probe order. Value and Text count even when
/// empty; the legacy sources and the name only when they carry text.
fn read_probe_text(element: &UIElement) -> Option<(String, TextSource)> {
    TextSource::PROBE_ORDER.into_iter().find_map(|source| {
        let text = element.read_text(source).ok().flatten()?;
        match source {
            TextSource::Value | TextSource::Text => Some((text, source)),
            _ if text.trim().is_empty() => None,
            _ => Some((text, source)),
        }
    })
}

/// Case-insensitive substring search; the first configured token found wins.
pub fn match_token<'a>(text: &str, tokens: &'a [String]) -> Option<&'a str> {
    if text.trim().is_empty() {
        return None;
    }
    let haystack = text.to_lowercase();
    tokens
        .iter()
        .find(|t| haystack.contains(&t.to_lowercase()))
        .map(String::as_str)
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}

fn record_evidence(step: &mut OpenStep, evidence: &OutcomeEvidence) {
    step.param("outcome", evidence.verdict.as_str());
    if let Some(hit) = evidence.success_hit {
        step.param("successHit", hit);
    }
    if let Some(hit) = evidence.failure_hit {
        step.param("failureHit", hit);
    }
    step.param("textProbed", evidence.text_probed);
    if let Some(token) = &evidence.matched_token {
        step.param("matchedToken", token);
    }
    if let Some(sample) = evidence.last_text_sample.as_deref().filter(|s| !s.trim().is_empty()) {
        step.param("textSample", sample);
    }
    if let Some(source) = evidence.text_source {
        step.param("textSampleSource", source.as_str());
    }
}

/// Response data; timing comes from the `BuildOutcome` entry just logged.
fn response_data(ctx: &FlowContext, plan: &BuildPlan, evidence: &OutcomeEvidence) -> Value {
    let timing = ctx.log().find("BuildOutcome");
    json!({
        "waitedKind": plan.wait.kind.as_str(),
        "buildOutcome": {
            "outcome": evidence.verdict.as_str(),
            "usedMode": plan.outcome.mode.as_str(),
            "selectorEvidence": {
                "successHit": evidence.success_hit,
                "failureHit": evidence.failure_hit,
            },
            "textEvidence": {
                "probed": evidence.text_probed,
                "lastTextSample": evidence.last_text_sample,
                "matchedToken": evidence.matched_token,
                "source": evidence.text_source.map(|s| s.as_str()),
            },
            "startedAtUtc": timing.map(|t| t.started_at_utc),
            "finishedAtUtc": timing.map(|t| t.finished_at_utc),
            "durationMs": timing.map(|t| t.duration_ms),
        },
    })
}

/// `CloseDialog`: attempted whenever configured; never fails the flow.
fn close_dialog(ctx: &mut FlowContext, roots: &Roots, plan: &BuildPlan, selector: &ElementSelector) {
    let mut step = OpenStep::new("CloseDialog", "Close dialog")
        .with_selector(Some(selector))
        .with_param("timeoutMs", plan.find_timeout_ms);
    add_root_params(&mut step, plan.search_root);

    let element = match roots.find_element(plan.search_root, selector, plan.find_timeout_ms) {
        Ok(element) => element,
        Err(e) => {
            ctx.warn(step, e);
            return;
        }
    };
    match element.click() {
        Ok(()) => ctx.succeed(step),
        Err(e) => ctx.warn(
            step,
            create_error(ErrorKind::ActionError, "Failed to close dialog", &e),
        ),
    }
}
