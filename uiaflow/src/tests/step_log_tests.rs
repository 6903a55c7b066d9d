use crate::rpc::{ErrorKind, RpcError};
use crate::selector::{ElementSelector, SelectorStep};
use crate::session::{Session, SessionRegistry};
use crate::step_log::{OpenStep, StepLog, StepOutcome};
use std::sync::Arc;

#[test]
fn closed_steps_keep_parameters_and_timing() {
    let mut step = OpenStep::new("FindElement", "Find element");
    step.param("timeoutMs", 500).param("root", "mainWindow");
    let entry = step.success();

    assert_eq!(entry.outcome, StepOutcome::Success);
    assert_eq!(entry.param("timeoutMs"), Some("500"));
    assert!(entry.finished_at_utc >= entry.started_at_utc);
    assert!(entry.duration_ms >= 0);
    assert!(entry.error.is_none());
}

#[test]
fn overlapping_filters_add_match_rule() {
    let mut s = SelectorStep::descendant().with_name("OK");
    s.name_contains = Some("O".to_string());
    let entry = OpenStep::new("Click", "Click")
        .with_selector(Some(&ElementSelector::single(s)))
        .success();
    assert_eq!(entry.param("matchRule"), Some("step0.Name=exact"));
    assert!(entry.selector.is_some());
}

#[test]
fn log_helpers_track_failures() {
    let mut log = StepLog::new();
    log.succeed(OpenStep::new("ValidateRequest", "Validate"));
    log.warn(
        OpenStep::new("BringToForeground", "Bring"),
        RpcError::new(ErrorKind::ActionError, "refused"),
    );
    let returned = log.fail(
        OpenStep::new("FindElement", "Find"),
        RpcError::new(ErrorKind::FindError, "Element not found"),
    );
    log.push(
        OpenStep::new("VerifyPaste", "Verify")
            .fail_or_warn(RpcError::new(ErrorKind::TimeoutError, "late"), true),
    );

    assert_eq!(returned.kind, ErrorKind::FindError);
    assert_eq!(
        log.outline(),
        vec![
            ("ValidateRequest".to_string(), StepOutcome::Success),
            ("BringToForeground".to_string(), StepOutcome::Warning),
            ("FindElement".to_string(), StepOutcome::Fail),
            ("VerifyPaste".to_string(), StepOutcome::Warning),
        ]
    );
    assert_eq!(log.first_failure().map(|s| s.step_id.as_str()), Some("FindElement"));
    assert_eq!(log.find("VerifyPaste").map(|s| s.outcome), Some(StepOutcome::Warning));
}

#[test]
fn entries_serialize_in_camel_case() {
    let mut log = StepLog::new();
    log.succeed(OpenStep::new("Attach", "Attach target process").with_param("processId", 42));
    let wire = serde_json::to_value(&log).unwrap();

    let step = &wire["steps"][0];
    assert_eq!(step["stepId"], "Attach");
    assert_eq!(step["outcome"], "Success");
    assert_eq!(step["parameters"]["processId"], "42");
    assert!(step.get("startedAtUtc").is_some());
    assert!(step.get("durationMs").is_some());
    assert!(step.get("error").is_none());

    let back: StepLog = serde_json::from_value(wire).unwrap();
    assert_eq!(back.steps.len(), 1);
}

#[test]
fn session_registry_ignores_blank_ids() {
    let engine = Arc::new(super::sample_engine());
    let registry = SessionRegistry::new();
    let session = registry.insert(Session::new(100, None, engine));

    assert_eq!(registry.len(), 1);
    assert_eq!(session.id().len(), 32);
    assert!(registry.get(session.id()).is_some());
    assert!(registry.get("  ").is_none());
    assert!(registry.remove("").is_none());
    assert!(registry.remove(session.id()).is_some());
    assert!(registry.is_empty());
}
