mod common;

use common::*;
use serde_json::{json, Value};
use uiaflow::clipboard::ClipboardFailureKind;
use uiaflow::rpc::ErrorKind;
use uiaflow::StepOutcome::{Fail, Success, Warning};

const PROGRAM: &str = "PROGRAM Main\n  VAR x : INT; END_VAR\n  x := x + 1;\nEND_PROGRAM";

fn data_of(result: &uiaflow::rpc::RpcResult<uiaflow::rpc::RunFlowResponse>) -> Value {
    result
        .value
        .clone()
        .and_then(|v| v.data)
        .expect("flow data")
}

fn paste_args() -> Value {
    json!({
        "programText": PROGRAM,
        "editorSelector": by_id("programEditor"),
        "afterPasteWaitMs": 0,
        "verifyTimeoutMs": 300,
        "findTimeoutMs": 1000,
        "clipboardRetry": { "times": 3, "intervalMs": 0 },
    })
}

#[test]
fn test_import_variables_through_dialog() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);

    let args = json!({
        "FilePath": "C:\\plc\\variables.xlsx",
        "SearchRoot": "desktop",
        "OpenImportSelector": by_id("openImportButton"),
        "DialogSelector": by_id("importDialog"),
        "FilePathEditorSelector": by_id("filePathEdit"),
        "ConfirmButtonSelector": by_id("importOkButton"),
        "FindTimeoutMs": 1000,
        "WaitTimeoutMs": 2000,
    });
    let result = run_flow(&service, &session_id, "autothink.importVariables", args);

    assert!(result.ok, "{:?}", result.error);
    assert_eq!(data_of(&result), json!({ "path": "C:\\plc\\variables.xlsx" }));
    assert_eq!(
        step_ids(&result),
        vec![
            "ValidateRequest",
            "DispatchFlow",
            "ResolveSession",
            "ValidateArgs",
            "GetMainWindow",
            "BringToForeground",
            "OpenImportDialog",
            "WaitDialogOpen",
            "SetFilePath",
            "ConfirmImport",
            "WaitImportDone",
        ]
    );
    assert_eq!(
        engine.content_of("filePathEdit").as_deref(),
        Some("C:\\plc\\variables.xlsx")
    );
    assert!(!engine.is_visible("importDialog"));
    assert_eq!(engine.content_of("statusLabel").as_deref(), Some("Imported"));
}

#[test]
fn test_import_variables_replaces_stale_path_without_value_pattern() {
    let tree = json!({
        "processes": [{
            "pid": 9,
            "name": "Importer",
            "mainWindow": {
                "name": "Importer",
                "controlType": "Window",
                "children": [
                    { "automationId": "pathBox", "controlType": "Edit", "text": "C:\\stale.xlsx" },
                    { "automationId": "ok", "name": "OK", "controlType": "Button" },
                ]
            }
        }]
    })
    .to_string();
    let (engine, service) = service_for(&tree);
    let session_id = open(&service, 9);

    let args = json!({
        "filePath": "C:\\plc\\vars.xlsx",
        "filePathEditorSelector": by_id("pathBox"),
        "confirmButtonSelector": by_id("ok"),
        "successCondition": { "kind": "ElementNotExists", "selector": by_id("busy") },
        "findTimeoutMs": 500,
        "waitTimeoutMs": 500,
    });
    let result = run_flow(&service, &session_id, "autothink.importVariables", args);

    assert!(result.ok, "{:?}", result.error);
    assert_eq!(engine.content_of("pathBox").as_deref(), Some("C:\\plc\\vars.xlsx"));
    assert!(engine.key_log().contains(&"CTRL+A".to_string()));
}

#[test]
fn test_import_variables_validation() {
    let (_, service) = demo_service();
    let session_id = open(&service, DEMO_PID);

    let cases = [
        (
            json!({ "filePathEditorSelector": by_id("filePathEdit") }),
            "FilePath must be provided",
        ),
        (
            json!({ "filePath": "a.xlsx", "confirmButtonSelector": by_id("importOkButton") }),
            "FilePathEditorSelector must be provided",
        ),
        (
            json!({
                "filePath": "a.xlsx",
                "filePathEditorSelector": by_id("filePathEdit"),
                "confirmButtonSelector": by_id("importOkButton"),
            }),
            "SuccessCondition or DialogSelector must be provided for completion wait",
        ),
    ];

    for (args, message) in cases {
        let result = run_flow(&service, &session_id, "autothink.importVariables", args);
        let error = result.error.as_ref().expect("validation error");
        assert_eq!(error.kind, ErrorKind::InvalidArgument);
        assert_eq!(error.message, message);
        assert_eq!(outcome_of(&result, "ValidateArgs"), Some(Fail));
        assert!(result.step_log.find("GetMainWindow").is_none());
    }
}

#[test]
fn test_flow_without_args_is_rejected() {
    let (_, service) = demo_service();
    let session_id = open(&service, DEMO_PID);

    let result = run_flow(&service, &session_id, "autothink.build", Value::Null);

    assert_eq!(
        result.error.as_ref().map(|e| e.message.as_str()),
        Some("Args must be provided")
    );
}

#[test]
fn test_import_program_pastes_through_clipboard() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);

    let result = run_flow(
        &service,
        &session_id,
        "autothink.importProgram.textPaste",
        paste_args(),
    );

    assert!(result.ok, "{:?}", result.error);
    let data = data_of(&result);
    assert_eq!(data["fallbackUsed"], json!(false));
    assert_eq!(data["verifyMode"], json!("editorNotEmpty"));
    assert_eq!(data["textLength"], json!(PROGRAM.chars().count()));

    assert_eq!(
        outline(&result)[3..].to_vec(),
        vec![
            s("ValidateArgs", Success),
            s("GetMainWindow", Success),
            s("BringToForeground", Success),
            s("OpenProgramEntry", Success),
            s("FindEditor", Success),
            s("FocusEditor", Success),
            s("SetClipboardText", Success),
            s("SetClipboardText.Attempt1", Success),
            s("SendKeysPaste", Success),
            s("VerifyPaste", Success),
        ]
    );
    assert_eq!(
        result
            .step_log
            .find("VerifyPaste")
            .and_then(|s| s.param("verification")),
        Some("ValuePattern")
    );
    assert_eq!(engine.content_of("programEditor").as_deref(), Some(PROGRAM));
    assert_eq!(engine.clipboard_text().as_deref(), Some(PROGRAM));
    assert!(engine.is_visible("programPasteIndicator"));
    assert!(engine.typed_text().is_empty());
}

#[test]
fn test_import_program_retries_clipboard() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);
    engine.push_clipboard_failure(ClipboardFailureKind::ClipboardBusy);
    engine.push_clipboard_failure(ClipboardFailureKind::AccessDenied);

    let result = run_flow(
        &service,
        &session_id,
        "autothink.importProgram.textPaste",
        paste_args(),
    );

    assert!(result.ok, "{:?}", result.error);
    assert_eq!(outcome_of(&result, "SetClipboardText"), Some(Success));
    assert_eq!(outcome_of(&result, "SetClipboardText.Attempt1"), Some(Warning));
    assert_eq!(outcome_of(&result, "SetClipboardText.Attempt2"), Some(Warning));
    assert_eq!(outcome_of(&result, "SetClipboardText.Attempt3"), Some(Success));
    assert_eq!(
        result
            .step_log
            .find("SetClipboardText.Attempt2")
            .and_then(|s| s.param("failureKind")),
        Some("AccessDenied")
    );
    assert_eq!(data_of(&result)["fallbackUsed"], json!(false));
}

#[test]
fn test_import_program_falls_back_to_typing_when_clipboard_is_down() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);
    engine.set_clipboard_unavailable(Some(ClipboardFailureKind::ClipboardBusy));

    let result = run_flow(
        &service,
        &session_id,
        "autothink.importProgram.textPaste",
        paste_args(),
    );

    assert!(result.ok, "{:?}", result.error);
    let summary = result.step_log.find("SetClipboardText").expect("summary");
    assert_eq!(summary.outcome, Warning);
    assert_eq!(summary.param("failureKind"), Some("ClipboardBusy"));
    let attempts: Vec<_> = result
        .step_log
        .steps
        .iter()
        .filter(|s| s.step_id.starts_with("SetClipboardText.Attempt"))
        .collect();
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|s| s.outcome == Warning));

    assert_eq!(outcome_of(&result, "SendKeysPaste"), Some(Warning));
    assert_eq!(outcome_of(&result, "FallbackTypeText"), Some(Success));
    assert_eq!(data_of(&result)["fallbackUsed"], json!(true));
    assert_eq!(engine.content_of("programEditor").as_deref(), Some(PROGRAM));
    assert!(!engine.key_log().contains(&"CTRL+V".to_string()));
}

#[test]
fn test_import_program_without_fallback_fails_on_clipboard() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);
    engine.set_clipboard_unavailable(Some(ClipboardFailureKind::AccessDenied));

    let mut args = paste_args();
    args["fallbackToType"] = json!(false);
    let result = run_flow(&service, &session_id, "autothink.importProgram.textPaste", args);

    let error = result.error.as_ref().expect("error");
    assert_eq!(error.kind, ErrorKind::ActionError);
    assert_eq!(error.message, "Clipboard set failed (AccessDenied)");
    assert_eq!(error.detail("failureKind"), Some("AccessDenied"));
    assert_eq!(outcome_of(&result, "SetClipboardText"), Some(Fail));
    assert_eq!(outcome_of(&result, "SetClipboardText.Attempt2"), Some(Warning));
    assert_eq!(outcome_of(&result, "SetClipboardText.Attempt3"), Some(Fail));
    assert!(result.step_log.find("SendKeysPaste").is_none());
    assert_eq!(engine.content_of("programEditor").as_deref(), Some(""));
}

#[test]
fn test_import_program_types_when_paste_is_swallowed() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);
    engine.set_paste_ignored(true);

    let result = run_flow(
        &service,
        &session_id,
        "autothink.importProgram.textPaste",
        paste_args(),
    );

    assert!(result.ok, "{:?}", result.error);
    let tail: Vec<_> = outline(&result)
        .into_iter()
        .skip_while(|(id, _)| id != "SendKeysPaste")
        .collect();
    assert_eq!(
        tail,
        vec![
            s("SendKeysPaste", Success),
            s("VerifyPaste", Warning),
            s("FallbackTypeText", Success),
            s("VerifyPasteAfterFallback", Success),
        ]
    );
    assert_eq!(data_of(&result)["fallbackUsed"], json!(true));
    assert_eq!(engine.content_of("programEditor").as_deref(), Some(PROGRAM));
}

#[test]
fn test_import_program_health_check_forces_typing() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);
    engine.push_clipboard_failure(ClipboardFailureKind::Unexpected);

    let mut args = paste_args();
    args["clipboardHealthCheck"] = json!(true);
    args["forceFallbackOnClipboardFailure"] = json!(true);
    args["clipboardRetry"] = json!({ "times": 1, "intervalMs": 0 });
    let result = run_flow(&service, &session_id, "autothink.importProgram.textPaste", args);

    assert!(result.ok, "{:?}", result.error);
    assert_eq!(outcome_of(&result, "ClipboardHealthCheck"), Some(Warning));
    assert_eq!(outcome_of(&result, "ClipboardHealthCheck.Attempt1"), Some(Warning));
    assert!(result.step_log.find("SetClipboardText").is_none());
    assert_eq!(outcome_of(&result, "SendKeysPaste"), Some(Warning));
    assert_eq!(engine.content_of("programEditor").as_deref(), Some(PROGRAM));
}

#[test]
fn test_import_program_runs_open_steps_and_dismisses_startup_popup() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);
    assert!(engine.is_visible("startupDialog"));

    let mut args = paste_args();
    args["openProgramSteps"] = json!([
        { "action": "click", "selector": by_id("importProgramButton") },
        {
            "action": "waitUntil",
            "condition": { "kind": "ElementExists", "selector": by_id("programEditor") },
            "timeoutMs": 500,
        },
    ]);
    args["enablePopupHandling"] = json!(true);
    args["allowPopupOk"] = json!(true);
    args["popupTimeoutMs"] = json!(300);
    args["popupDialogSelector"] = by_id("startupDialog");
    args["popupOkButtonSelector"] = by_id("popupOkButton");
    let result = run_flow(&service, &session_id, "autothink.importProgram.textPaste", args);

    assert!(result.ok, "{:?}", result.error);
    let detected = result
        .step_log
        .find("PopupDetected.BeforePaste")
        .expect("popup check");
    assert_eq!(detected.param("found"), Some("true"));
    assert_eq!(detected.param("title"), Some("Notice"));
    let dismissed = result
        .step_log
        .find("PopupDismissed.BeforePaste")
        .expect("popup dismissal");
    assert_eq!(dismissed.outcome, Success);
    assert_eq!(dismissed.param("button"), Some("ok"));
    assert!(!engine.is_visible("startupDialog"));

    assert_eq!(
        result
            .step_log
            .find("PopupDetected.AfterPaste")
            .and_then(|s| s.param("found")),
        Some("false")
    );
    assert!(result.step_log.find("PopupDismissed.AfterPaste").is_none());
    assert_eq!(engine.click_count("importProgramButton"), 1);
    assert_eq!(engine.content_of("programEditor").as_deref(), Some(PROGRAM));
}

#[test]
fn test_import_program_validation() {
    let (_, service) = demo_service();
    let session_id = open(&service, DEMO_PID);

    let mut no_fallback = paste_args();
    no_fallback["preferClipboard"] = json!(false);
    no_fallback["fallbackToType"] = json!(false);

    let mut bad_verify = paste_args();
    bad_verify["verifyMode"] = json!("elementExists");

    let mut popup_without_buttons = paste_args();
    popup_without_buttons["enablePopupHandling"] = json!(true);
    popup_without_buttons["popupDialogSelector"] = by_id("startupDialog");

    let cases = [
        (json!({ "editorSelector": by_id("programEditor") }), "ProgramText must be provided"),
        (
            no_fallback,
            "preferClipboard=false requires fallbackToType=true",
        ),
        (
            bad_verify,
            "VerifySelector must be provided when VerifyMode=elementExists",
        ),
        (
            popup_without_buttons,
            "PopupCancelButtonSelector is required unless AllowPopupOk is true and PopupOkButtonSelector is provided",
        ),
    ];
    for (args, message) in cases {
        let result = run_flow(&service, &session_id, "autothink.importProgram.textPaste", args);
        assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArgument));
        assert_eq!(result.error.as_ref().map(|e| e.message.as_str()), Some(message));
    }
}

fn build_args() -> Value {
    json!({
        "buildButtonSelector": by_id("buildButton"),
        "waitCondition": { "kind": "ElementExists", "selector": by_id("buildSucceededIndicator") },
        "timeoutMs": 3000,
        "findTimeoutMs": 1000,
        "buildOutcome": {
            "mode": "waitSelector",
            "successSelector": by_id("buildSucceededIndicator"),
            "timeoutMs": 500,
        },
    })
}

#[test]
fn test_build_succeeds_on_demo_target() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);

    let result = run_flow(&service, &session_id, "autothink.build", build_args());

    assert!(result.ok, "{:?}", result.error);
    assert_eq!(
        step_ids(&result)[3..].to_vec(),
        vec![
            "ValidateArgs",
            "GetMainWindow",
            "FindBuildButton",
            "ClickBuild",
            "WaitBuildDone",
            "BuildOutcome",
        ]
    );
    let data = data_of(&result);
    assert_eq!(data["waitedKind"], json!("ElementExists"));
    assert_eq!(data["buildOutcome"]["outcome"], json!("Success"));
    assert_eq!(data["buildOutcome"]["usedMode"], json!("waitSelector"));
    assert_eq!(data["buildOutcome"]["selectorEvidence"]["successHit"], json!(true));
    assert!(data["buildOutcome"]["durationMs"].is_i64());
    assert_eq!(engine.click_count("buildButton"), 1);
    assert_eq!(engine.content_of("statusLabel").as_deref(), Some("Build OK"));
}

#[test]
fn test_build_closes_confirm_dialog() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);

    let mut args = build_args();
    args["searchRoot"] = json!("desktop");
    args["optionalCloseDialogSelector"] = by_id("popupOkButton");
    engine.hide("startupDialog");
    let result = run_flow(&service, &session_id, "autothink.build", args);

    assert!(result.ok, "{:?}", result.error);
    assert_eq!(outcome_of(&result, "CloseDialog"), Some(Success));
    assert!(!engine.is_visible("buildConfirmDialog"));
}

fn builder_tree(on_click: Value, status: &str) -> String {
    json!({
        "processes": [{
            "pid": 9,
            "name": "Builder",
            "mainWindow": {
                "name": "Builder",
                "controlType": "Window",
                "children": [
                    { "automationId": "build", "name": "Build", "controlType": "Button", "onClick": on_click },
                    { "automationId": "done", "controlType": "Text", "visible": false },
                    { "automationId": "okBadge", "controlType": "Text", "visible": false },
                    { "automationId": "failBadge", "controlType": "Text", "visible": false },
                    { "automationId": "errorBox", "controlType": "Window", "visible": false },
                    { "automationId": "status", "controlType": "Text", "text": status },
                ]
            }
        }]
    })
    .to_string()
}

#[test]
fn test_build_failure_selector_wins_over_success() {
    let tree = builder_tree(json!({ "show": ["done", "okBadge", "failBadge"] }), "Idle");
    let (_, service) = service_for(&tree);
    let session_id = open(&service, 9);

    let args = json!({
        "buildButtonSelector": by_id("build"),
        "waitCondition": { "kind": "ElementExists", "selector": by_id("done") },
        "timeoutMs": 1000,
        "buildOutcome": {
            "mode": "either",
            "successSelector": by_id("okBadge"),
            "failureSelector": by_id("failBadge"),
            "timeoutMs": 300,
        },
    });
    let result = run_flow(&service, &session_id, "autothink.build", args);

    let error = result.error.as_ref().expect("error");
    assert_eq!(error.kind, ErrorKind::UnexpectedUIState);
    assert_eq!(error.message, "Build failed (failure selector matched)");
    assert_eq!(outcome_of(&result, "BuildOutcome"), Some(Fail));
    let data = data_of(&result);
    assert_eq!(data["buildOutcome"]["outcome"], json!("Fail"));
    assert_eq!(data["buildOutcome"]["selectorEvidence"]["failureHit"], json!(true));
}

#[test]
fn test_build_outcome_unknown_is_timeout() {
    let tree = builder_tree(json!({ "show": ["done"] }), "Idle");
    let (_, service) = service_for(&tree);
    let session_id = open(&service, 9);

    let args = json!({
        "buildButtonSelector": by_id("build"),
        "waitCondition": { "kind": "ElementExists", "selector": by_id("done") },
        "timeoutMs": 1000,
        "buildOutcome": { "mode": "waitSelector", "successSelector": by_id("okBadge"), "timeoutMs": 200 },
    });
    let result = run_flow(&service, &session_id, "autothink.build", args);

    assert_eq!(result.error_kind(), Some(ErrorKind::TimeoutError));
    assert_eq!(
        result.error.as_ref().map(|e| e.message.as_str()),
        Some("Build outcome unknown")
    );
    assert_eq!(data_of(&result)["buildOutcome"]["outcome"], json!("Unknown"));
}

#[test]
fn test_build_reads_status_text() {
    let tree = builder_tree(
        json!({
            "show": ["done"],
            "setText": [{ "target": "status", "value": "Build finished: 0 Errors, 2 warnings" }],
        }),
        "Idle",
    );
    let (_, service) = service_for(&tree);
    let session_id = open(&service, 9);

    let args = json!({
        "BuildButtonSelector": by_id("build"),
        "CompletedCondition": { "Kind": "ElementExists", "Selector": by_id("done") },
        "TimeoutMs": 1000,
        "BuildOutcome": {
            "Mode": "readTextContains",
            "TextProbeSelector": by_id("status"),
            "SuccessTextContains": ["0 errors", "succeeded"],
            "TimeoutMs": 300,
        },
    });
    let result = run_flow(&service, &session_id, "autothink.build", args);

    assert!(result.ok, "{:?}", result.error);
    let step = result.step_log.find("BuildOutcome").expect("outcome step");
    assert_eq!(step.param("matchedToken"), Some("0 errors"));
    assert_eq!(step.param("textSampleSource"), Some("Text"));
    let text = &data_of(&result)["buildOutcome"]["textEvidence"];
    assert_eq!(text["probed"], json!(true));
    assert_eq!(text["source"], json!("Text"));
}

#[test]
fn test_build_aborts_on_unexpected_dialog() {
    let tree = builder_tree(json!({ "show": ["errorBox"] }), "Idle");
    let (_, service) = service_for(&tree);
    let session_id = open(&service, 9);

    let args = json!({
        "buildButtonSelector": by_id("build"),
        "waitCondition": { "kind": "ElementExists", "selector": by_id("done") },
        "timeoutMs": 5000,
        "unexpectedSelectors": [by_id("nothingLikeThis"), by_id("errorBox")],
    });
    let started = std::time::Instant::now();
    let result = run_flow(&service, &session_id, "autothink.build", args);

    let error = result.error.as_ref().expect("error");
    assert_eq!(error.kind, ErrorKind::UnexpectedUIState);
    assert_eq!(error.detail("selectorIndex"), Some("1"));
    assert_eq!(outcome_of(&result, "WaitBuildDone"), Some(Fail));
    assert!(result.step_log.find("BuildOutcome").is_none());
    assert!(started.elapsed() < std::time::Duration::from_secs(4));
}

#[test]
fn test_build_missing_button_is_find_error() {
    let tree = builder_tree(json!({}), "Idle");
    let (_, service) = service_for(&tree);
    let session_id = open(&service, 9);

    let args = json!({
        "buildButtonSelector": by_id("rebuild"),
        "waitCondition": { "kind": "ElementExists", "selector": by_id("done") },
        "findTimeoutMs": 300,
    });
    let result = run_flow(&service, &session_id, "autothink.build", args);

    assert_eq!(result.error_kind(), Some(ErrorKind::FindError));
    assert_eq!(outcome_of(&result, "FindBuildButton"), Some(Fail));
    assert!(result.value.is_none());
}
