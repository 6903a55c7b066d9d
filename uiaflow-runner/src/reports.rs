//! Run artifacts: per-flow step logs, `summary.json` and `build_outcome.json`.

use crate::profiles::SelectorKeyIndex;
use crate::recovery::RecoverySummary;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uiaflow::flows::names;
use uiaflow::rpc::{RpcResult, RunFlowResponse};
use uiaflow::{StepLog, StepLogEntry, StepOutcome};

pub const SUMMARY_FILE: &str = "summary.json";
pub const BUILD_OUTCOME_FILE: &str = "build_outcome.json";

pub const NOT_RUN: &str = "NotRun";
pub const SKIPPED_BY_CONFIG: &str = "Skipped by config";
pub const SKIPPED_AFTER_FAILURE: &str = "Skipped due to previous failure";

/// Pretty-printed JSON, parent directories created as needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
}

/// `{logs_root}/yyyyMMdd-HHmmss` in local time, created if missing
pub fn create_run_dir(logs_root: &Path) -> std::io::Result<PathBuf> {
    let dir = logs_root.join(Local::now().format("%Y%m%d-%H%M%S").to_string());
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Step log of one flow run, written to `{run_dir}/{flow_name}.json`
pub fn write_step_log(run_dir: &Path, flow_name: &str, log: &StepLog) -> std::io::Result<PathBuf> {
    let path = run_dir.join(format!("{flow_name}.json"));
    write_json(&path, log)?;
    Ok(path)
}

/// A finished `RunFlow` call and the step log file written for it
#[derive(Debug, Clone)]
pub struct FlowRunResult {
    pub result: RpcResult<RunFlowResponse>,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClipboardSummary {
    pub attempted: bool,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,
    pub retries: usize,
    pub used_fallback: bool,
    pub health_check_attempted: bool,
    pub health_check_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_check_failure_kind: Option<String>,
    pub health_check_retries: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FlowRunSummary {
    pub name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector_key: Option<String>,
    pub root: String,
    pub selectors_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub popup_handled_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_popup_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clipboard: Option<ClipboardSummary>,
}

impl FlowRunSummary {
    /// A flow that failed before `RunFlow` was sent, e.g. on a config error.
    pub fn failed(name: &str, kind: &str, message: impl Into<String>, root: &str, selectors_file: &Path) -> Self {
        Self {
            name: name.to_string(),
            ok: false,
            error_kind: Some(kind.to_string()),
            error_message: Some(message.into()),
            root: root.to_string(),
            selectors_file: selectors_file.display().to_string(),
            ..Self::default()
        }
    }

    pub fn not_run(name: &str, reason: &str, root: &str, selectors_file: &Path) -> Self {
        Self::failed(name, NOT_RUN, reason, root, selectors_file)
    }
}

/// Summarises one flow run from its RPC result and step log.
pub fn create_summary(
    flow_name: &str,
    run: &FlowRunResult,
    root: &str,
    selectors_file: &Path,
    keys: &SelectorKeyIndex,
) -> FlowRunSummary {
    let result = &run.result;
    let log = &result.step_log;
    let mut summary = FlowRunSummary {
        name: flow_name.to_string(),
        ok: result.ok,
        error_kind: result.error.as_ref().map(|e| e.kind.as_str().to_string()),
        error_message: result.error.as_ref().map(|e| e.message.clone()),
        root: root.to_string(),
        selectors_file: selectors_file.display().to_string(),
        log_file: run.log_file.as_ref().map(|p| p.display().to_string()),
        ..FlowRunSummary::default()
    };

    if let Some(failed) = log.first_failure() {
        summary.failed_step_id = Some(failed.step_id.clone());
        summary.selector_key = failed
            .selector
            .as_ref()
            .and_then(|s| keys.key_for(s))
            .map(str::to_string);
        if summary.error_kind.is_none() {
            if let Some(error) = &failed.error {
                summary.error_kind = Some(error.kind.as_str().to_string());
                summary.error_message = Some(error.message.clone());
            }
        }
    }

    if !summary.ok && summary.error_kind.is_none() {
        summary.error_kind = Some("RpcError".to_string());
    }
    if !summary.ok {
        if let Some(key) = &summary.selector_key {
            summary.error_message = Some(match summary.error_message.take() {
                None => format!("selectorKey={key}"),
                Some(message) if message.contains(key.as_str()) => message,
                Some(message) => format!("{message} (selectorKey={key})"),
            });
        }
    }

    summary.duration_ms = step_log_duration(log);
    let (count, title) = popups_handled(log);
    summary.popup_handled_count = count;
    summary.last_popup_title = title;

    if flow_name == names::IMPORT_PROGRAM_TEXT_PASTE {
        summary.clipboard = Some(clipboard_summary(log));
    }
    summary
}

/// Milliseconds from the earliest start to the latest finish
pub fn step_log_duration(log: &StepLog) -> Option<i64> {
    let started = log.steps.iter().map(|s| s.started_at_utc).min()?;
    let finished = log.steps.iter().map(|s| s.finished_at_utc.max(s.started_at_utc)).max()?;
    Some((finished - started).num_milliseconds())
}

fn popups_handled(log: &StepLog) -> (usize, Option<String>) {
    let dismissed: Vec<&StepLogEntry> = log
        .steps
        .iter()
        .filter(|s| s.step_id.starts_with("PopupDismissed"))
        .collect();
    let title = dismissed
        .iter()
        .rev()
        .find_map(|s| s.param("title").filter(|t| !t.trim().is_empty()))
        .map(str::to_string);
    (dismissed.len(), title)
}

struct AttemptStats {
    attempted: bool,
    ok: bool,
    retries: usize,
    failure_kind: Option<String>,
}

fn attempt_stats(log: &StepLog, prefix: &str) -> AttemptStats {
    let attempts: Vec<&StepLogEntry> = log.steps.iter().filter(|s| s.step_id.starts_with(prefix)).collect();
    let ok = attempts.iter().any(|s| s.outcome == StepOutcome::Success);
    let failure_kind = if !attempts.is_empty() && !ok {
        attempts.last().and_then(|last| {
            last.param("failureKind")
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .or_else(|| last.error.as_ref().map(|e| e.kind.as_str().to_string()))
        })
    } else {
        None
    };
    AttemptStats {
        attempted: !attempts.is_empty(),
        ok,
        retries: attempts.len().saturating_sub(1),
        failure_kind,
    }
}

pub fn clipboard_summary(log: &StepLog) -> ClipboardSummary {
    let set = attempt_stats(log, "SetClipboardText.Attempt");
    let health = attempt_stats(log, "ClipboardHealthCheck.Attempt");
    ClipboardSummary {
        attempted: set.attempted,
        ok: set.ok,
        failure_kind: set.failure_kind,
        retries: set.retries,
        used_fallback: log
            .steps
            .iter()
            .any(|s| s.step_id == "FallbackTypeText" && s.outcome == StepOutcome::Success),
        health_check_attempted: health.attempted,
        health_check_ok: health.ok,
        health_check_failure_kind: health.failure_kind,
        health_check_retries: health.retries,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectorEvidence {
    pub success_hit: Option<bool>,
    pub failure_hit: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextEvidence {
    pub probed: bool,
    pub last_text_sample: Option<String>,
    pub matched_token: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildOutcomeReport {
    pub outcome: String,
    pub used_mode: Option<String>,
    pub selector_evidence: Option<SelectorEvidence>,
    pub text_evidence: Option<TextEvidence>,
    pub started_at_utc: Option<DateTime<Utc>>,
    pub finished_at_utc: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl Default for BuildOutcomeReport {
    fn default() -> Self {
        Self {
            outcome: "Unknown".to_string(),
            used_mode: None,
            selector_evidence: None,
            text_evidence: None,
            started_at_utc: None,
            finished_at_utc: None,
            duration_ms: None,
            error_kind: None,
            error_message: None,
        }
    }
}

fn parse_bool(value: Option<&str>) -> Option<bool> {
    value.and_then(|v| v.trim().to_ascii_lowercase().parse().ok())
}

/// Reads the last `BuildOutcome` entry of the build flow's step log.
pub fn build_outcome_report(log: &StepLog) -> BuildOutcomeReport {
    let Some(step) = log.steps.iter().rev().find(|s| s.step_id == "BuildOutcome") else {
        return BuildOutcomeReport {
            error_message: Some("BuildOutcome step missing".to_string()),
            ..BuildOutcomeReport::default()
        };
    };

    BuildOutcomeReport {
        outcome: step
            .param("outcome")
            .filter(|o| !o.trim().is_empty())
            .unwrap_or("Unknown")
            .to_string(),
        used_mode: step.param("mode").map(str::to_string),
        selector_evidence: Some(SelectorEvidence {
            success_hit: parse_bool(step.param("successHit")),
            failure_hit: parse_bool(step.param("failureHit")),
        }),
        text_evidence: Some(TextEvidence {
            probed: parse_bool(step.param("textProbed")).unwrap_or(false),
            last_text_sample: step.param("textSample").map(str::to_string),
            matched_token: step.param("matchedToken").map(str::to_string),
            source: step.param("textSampleSource").map(str::to_string),
        }),
        started_at_utc: Some(step.started_at_utc),
        finished_at_utc: Some(step.finished_at_utc),
        duration_ms: Some(step.duration_ms),
        error_kind: step.error.as_ref().map(|e| e.kind.as_str().to_string()),
        error_message: step.error.as_ref().map(|e| e.message.clone()),
    }
}

/// `build` block of the run summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence_path: Option<String>,
}

/// `inputsSource` block of the run summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputsSourceSummary {
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comm_ir_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_inputs_path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub profile: String,
    pub run_dir: String,
    pub flows: Vec<FlowRunSummary>,
    pub generated_at_utc: DateTime<Utc>,
    pub connectivity_ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectivity_failed_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectivity_hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectivity_report: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_because: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs_source: Option<InputsSourceSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_state_recovery: Option<RecoverySummary>,
}

impl RunSummary {
    pub fn flow(&self, name: &str) -> Option<&FlowRunSummary> {
        self.flows.iter().find(|f| f.name == name)
    }
}
