use super::{by_id, profile_of};
use crate::profiles::SelectorKeyIndex;
use crate::reports::{
    build_outcome_report, clipboard_summary, create_summary, FlowRunResult, FlowRunSummary, RunSummary, NOT_RUN,
    SKIPPED_BY_CONFIG,
};
use chrono::Utc;
use std::path::Path;
use uiaflow::flows::names;
use uiaflow::rpc::{ErrorKind, RpcError, RpcResult, RunFlowResponse};
use uiaflow::{OpenStep, StepLog, StepLogEntry};

fn log_of(entries: Vec<StepLogEntry>) -> StepLog {
    let mut log = StepLog::new();
    for entry in entries {
        log.push(entry);
    }
    log
}

fn failed_step(id: &str, kind: ErrorKind, failure_kind: &str) -> StepLogEntry {
    OpenStep::new(id, "Set clipboard")
        .with_param("failureKind", failure_kind)
        .fail(RpcError::new(kind, "clipboard unavailable"))
}

fn ok_step(id: &str) -> StepLogEntry {
    OpenStep::new(id, "step").success()
}

#[test]
fn failed_flow_reports_first_failing_step_and_its_key() {
    let log = log_of(vec![
        ok_step("ValidateArgs"),
        OpenStep::new("FindBuildButton", "Find build button")
            .with_selector(Some(&by_id("buildButton")))
            .fail(RpcError::new(ErrorKind::FindError, "Element not found")),
    ]);
    let run = FlowRunResult {
        result: RpcResult::<RunFlowResponse>::failure(RpcError::new(ErrorKind::FindError, "Element not found"), log),
        log_file: Some(Path::new("run").join("autothink.build.json")),
    };
    let keys = SelectorKeyIndex::from_profile(&profile_of(&[("buildButton", "buildButton")]));

    let summary = create_summary(names::BUILD, &run, "mainWindow", Path::new("autothink.build.json"), &keys);

    assert!(!summary.ok);
    assert_eq!(summary.error_kind.as_deref(), Some("FindError"));
    assert_eq!(summary.failed_step_id.as_deref(), Some("FindBuildButton"));
    assert_eq!(summary.selector_key.as_deref(), Some("buildButton"));
    assert_eq!(
        summary.error_message.as_deref(),
        Some("Element not found (selectorKey=buildButton)")
    );
    assert!(summary.duration_ms.is_some_and(|d| d >= 0));
    assert!(summary.clipboard.is_none());
}

#[test]
fn failure_without_error_is_an_rpc_error() {
    let mut result = RpcResult::<RunFlowResponse>::success(RunFlowResponse::default(), StepLog::new());
    result.ok = false;
    let run = FlowRunResult { result, log_file: None };

    let summary = create_summary(names::ATTACH, &run, "mainWindow", Path::new(""), &SelectorKeyIndex::default());
    assert_eq!(summary.error_kind.as_deref(), Some("RpcError"));
    assert_eq!(summary.duration_ms, None);
}

#[test]
fn popups_dismissed_are_counted() {
    let log = log_of(vec![
        OpenStep::new("PopupDismissed.BeforePaste", "Dismiss popup")
            .with_param("title", "Notice")
            .success(),
        OpenStep::new("PopupDismissed.AfterPaste", "Dismiss popup")
            .with_param("title", " ")
            .success(),
    ]);
    let run = FlowRunResult {
        result: RpcResult::success(RunFlowResponse::default(), log),
        log_file: None,
    };
    let summary = create_summary(
        names::IMPORT_PROGRAM_TEXT_PASTE,
        &run,
        "mainWindow",
        Path::new(""),
        &SelectorKeyIndex::default(),
    );
    assert_eq!(summary.popup_handled_count, 2);
    assert_eq!(summary.last_popup_title.as_deref(), Some("Notice"));
    assert!(summary.clipboard.is_some());
}

#[test]
fn clipboard_summary_counts_attempts_and_fallback() {
    let log = log_of(vec![
        failed_step("SetClipboardText.Attempt1", ErrorKind::ActionError, "ClipboardBusy"),
        failed_step("SetClipboardText.Attempt2", ErrorKind::ActionError, "AccessDenied"),
        failed_step("SetClipboardText.Attempt3", ErrorKind::ActionError, ""),
        ok_step("FallbackTypeText"),
    ]);

    let summary = clipboard_summary(&log);

    assert!(summary.attempted);
    assert!(!summary.ok);
    assert_eq!(summary.retries, 2);
    assert_eq!(summary.failure_kind.as_deref(), Some("ActionError"));
    assert!(summary.used_fallback);
    assert!(!summary.health_check_attempted);
}

#[test]
fn clipboard_summary_after_retry_success() {
    let log = log_of(vec![
        failed_step("ClipboardHealthCheck.Attempt1", ErrorKind::ActionError, "ClipboardBusy"),
        ok_step("ClipboardHealthCheck.Attempt2"),
        failed_step("SetClipboardText.Attempt1", ErrorKind::ActionError, "ClipboardBusy"),
        ok_step("SetClipboardText.Attempt2"),
    ]);

    let summary = clipboard_summary(&log);

    assert!(summary.ok);
    assert_eq!(summary.retries, 1);
    assert_eq!(summary.failure_kind, None);
    assert!(!summary.used_fallback);
    assert!(summary.health_check_attempted);
    assert!(summary.health_check_ok);
    assert_eq!(summary.health_check_retries, 1);
}

#[test]
fn build_outcome_reads_the_outcome_step() {
    let log = log_of(vec![OpenStep::new("BuildOutcome", "Read build outcome")
        .with_param("outcome", "Success")
        .with_param("mode", "waitSelector")
        .with_param("successHit", "True")
        .with_param("textProbed", "false")
        .success()]);

    let report = build_outcome_report(&log);

    assert_eq!(report.outcome, "Success");
    assert_eq!(report.used_mode.as_deref(), Some("waitSelector"));
    let selectors = report.selector_evidence.expect("selector evidence");
    assert_eq!(selectors.success_hit, Some(true));
    assert_eq!(selectors.failure_hit, None);
    assert!(!report.text_evidence.expect("text evidence").probed);

    let missing = build_outcome_report(&StepLog::new());
    assert_eq!(missing.outcome, "Unknown");
    assert_eq!(missing.error_message.as_deref(), Some("BuildOutcome step missing"));
}

#[test]
fn not_run_entries_serialize_camel_case() {
    let summary = RunSummary {
        profile: "autothink".to_string(),
        run_dir: "run".to_string(),
        flows: vec![FlowRunSummary::not_run(
            names::BUILD,
            SKIPPED_BY_CONFIG,
            "mainWindow",
            Path::new("autothink.build.json"),
        )],
        generated_at_utc: Utc::now(),
        connectivity_ok: true,
        connectivity_failed_reason: None,
        connectivity_hint: None,
        connectivity_report: None,
        stopped_because: None,
        inputs_source: None,
        build: None,
        ui_state_recovery: None,
    };
    let json = serde_json::to_value(&summary).expect("summary encodes");

    assert_eq!(json["flows"][0]["errorKind"], NOT_RUN);
    assert_eq!(json["flows"][0]["errorMessage"], SKIPPED_BY_CONFIG);
    assert_eq!(json["flows"][0]["selectorsFile"], "autothink.build.json");
    assert_eq!(json["connectivityOk"], true);
    assert!(json.get("stoppedBecause").is_none());
    assert_eq!(summary.flow(names::BUILD).map(|f| f.ok), Some(false));
}
