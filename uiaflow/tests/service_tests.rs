mod common;

use common::*;
use serde_json::json;
use uiaflow::flows::{Flow, FlowContext, FlowOutcome, FlowRegistry};
use uiaflow::rpc::envelope::{INVALID_PARAMS, METHOD_NOT_FOUND};
use uiaflow::rpc::{
    CloseSessionRequest, ElementRef, ElementRefRequest, ErrorKind, FindElementRequest,
    JsonRpcRequest, OpenSessionRequest, RunFlowRequest, SendKeysRequest, SetTextRequest,
    WaitUntilRequest,
};
use uiaflow::selector::{ElementSelector, SelectorStep, WaitCondition, WaitConditionKind};
use uiaflow::StepOutcome::{Fail, Success, Warning};

fn selector(automation_id: &str) -> ElementSelector {
    ElementSelector::single(SelectorStep::descendant().with_automation_id(automation_id))
}

fn find(service: &uiaflow::UiaRpcService, session_id: &str, automation_id: &str) -> ElementRef {
    let result = service.find_element(Some(FindElementRequest {
        session_id: session_id.to_string(),
        selector: selector(automation_id),
        timeout_ms: 1000,
    }));
    assert!(result.ok, "FindElement {automation_id} failed: {:?}", result.error);
    result.value.expect("element").element
}

#[test]
fn test_open_session_by_name_attaches_and_activates() {
    let (engine, service) = demo_service();

    let result = service.open_session(Some(OpenSessionRequest {
        process_name: Some("Autothink.DemoTarget.exe".to_string()),
        timeout_ms: 1000,
        ..Default::default()
    }));

    assert!(result.ok, "{:?}", result.error);
    let value = result.value.clone().expect("value");
    assert_eq!(value.process_id, DEMO_PID);
    assert_eq!(value.main_window_title.as_deref(), Some("AUTOTHINK Demo Target"));
    assert_eq!(
        outline(&result),
        vec![
            s("ValidateRequest", Success),
            s("Attach", Success),
            s("GetMainWindow", Success),
            s("BringToForeground", Success),
        ]
    );
    let attach = result.step_log.find("Attach").expect("attach step");
    assert_eq!(attach.param("resolvedProcessId"), Some("4242"));
    assert_eq!(engine.activation_count(), 1);
    assert_eq!(service.sessions().len(), 1);
}

#[test]
fn test_open_session_by_pid_without_foreground() {
    let (engine, service) = demo_service();

    let result = service.open_session(Some(OpenSessionRequest {
        process_id: Some(DEMO_PID),
        bring_to_foreground: false,
        timeout_ms: 1000,
        ..Default::default()
    }));

    assert!(result.ok);
    assert_eq!(
        step_ids(&result),
        vec!["ValidateRequest", "Attach", "GetMainWindow"]
    );
    assert_eq!(engine.activation_count(), 0);
}

#[test]
fn test_open_session_requires_process() {
    let (_, service) = demo_service();

    let result = service.open_session(Some(OpenSessionRequest {
        process_name: Some("   ".to_string()),
        ..Default::default()
    }));

    assert!(!result.ok);
    assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArgument));
    assert_eq!(
        result.error.as_ref().map(|e| e.message.as_str()),
        Some("ProcessId or ProcessName must be provided")
    );
    assert_eq!(outline(&result), vec![s("ValidateRequest", Fail)]);
    assert!(service.sessions().is_empty());
}

#[test]
fn test_null_request_is_rejected() {
    let (_, service) = demo_service();

    let result = service.open_session(None);
    assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArgument));
    assert_eq!(
        result.error.as_ref().map(|e| e.message.as_str()),
        Some("request must not be null")
    );

    let result = service.send_keys(None);
    assert_eq!(outline(&result), vec![s("ValidateRequest", Fail)]);
}

#[test]
fn test_open_session_unknown_process_fails_with_config_error() {
    let (_, service) = demo_service();

    let result = service.open_session(Some(OpenSessionRequest {
        process_name: Some("NoSuchApp".to_string()),
        timeout_ms: 200,
        ..Default::default()
    }));

    assert_eq!(result.error_kind(), Some(ErrorKind::ConfigError));
    assert_eq!(
        result.error.as_ref().map(|e| e.message.as_str()),
        Some("OpenSession failed")
    );
    assert_eq!(
        outline(&result),
        vec![
            s("ValidateRequest", Success),
            s("Attach", Fail),
            s("OpenSession", Fail),
        ]
    );
    assert!(service.sessions().is_empty());
}

#[test]
fn test_open_session_unknown_pid_fails_at_main_window() {
    let (_, service) = demo_service();

    let result = service.open_session(Some(OpenSessionRequest {
        process_id: Some(1),
        timeout_ms: 200,
        ..Default::default()
    }));

    assert_eq!(result.error_kind(), Some(ErrorKind::ConfigError));
    assert_eq!(
        outline(&result),
        vec![
            s("ValidateRequest", Success),
            s("Attach", Success),
            s("GetMainWindow", Fail),
            s("OpenSession", Fail),
        ]
    );
}

#[test]
fn test_close_session() {
    let (_, service) = demo_service();
    let session_id = open(&service, DEMO_PID);

    let closed = service.close_session(Some(CloseSessionRequest {
        session_id: session_id.clone(),
    }));
    assert!(closed.ok);
    assert!(service.sessions().is_empty());

    let again = service.close_session(Some(CloseSessionRequest { session_id }));
    assert_eq!(again.error_kind(), Some(ErrorKind::ConfigError));
    assert_eq!(
        again.error.as_ref().map(|e| e.message.as_str()),
        Some("Session not found")
    );
    assert_eq!(
        outline(&again),
        vec![s("ValidateRequest", Success), s("CloseSession", Fail)]
    );
}

#[test]
fn test_find_element_returns_reference() {
    let (_, service) = demo_service();
    let session_id = open(&service, DEMO_PID);

    let result = service.find_element(Some(FindElementRequest {
        session_id: session_id.clone(),
        selector: selector("buildButton"),
        timeout_ms: 1000,
    }));

    assert!(result.ok, "{:?}", result.error);
    let element = result.value.clone().expect("value").element;
    assert_eq!(element.session_id, session_id);
    assert!(element
        .runtime_id
        .as_deref()
        .is_some_and(|id| id.starts_with("mem-")));
    assert_eq!(
        outline(&result),
        vec![
            s("ValidateRequest", Success),
            s("ResolveSession", Success),
            s("GetMainWindow", Success),
            s("FindElement", Success),
        ]
    );
}

#[test]
fn test_find_element_not_found_and_unknown_session() {
    let (_, service) = demo_service();
    let session_id = open(&service, DEMO_PID);

    let missing = service.find_element(Some(FindElementRequest {
        session_id,
        selector: selector("doesNotExist"),
        timeout_ms: 300,
    }));
    assert_eq!(missing.error_kind(), Some(ErrorKind::FindError));
    assert_eq!(outcome_of(&missing, "FindElement"), Some(Fail));

    let unknown = service.find_element(Some(FindElementRequest {
        session_id: "nope".to_string(),
        selector: selector("buildButton"),
        timeout_ms: 300,
    }));
    assert_eq!(unknown.error_kind(), Some(ErrorKind::ConfigError));
    assert_eq!(
        outline(&unknown),
        vec![s("ValidateRequest", Success), s("ResolveSession", Fail)]
    );
}

#[test]
fn test_click_runs_scripted_behaviour() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);
    let button = find(&service, &session_id, "openImportButton");

    assert!(!engine.is_visible("importDialog"));
    let result = service.click(Some(ElementRefRequest {
        element: Some(button),
    }));

    assert!(result.ok, "{:?}", result.error);
    assert_eq!(
        outline(&result),
        vec![
            s("ValidateRequest", Success),
            s("ResolveSession", Success),
            s("ResolveElement", Success),
            s("Click", Success),
        ]
    );
    assert_eq!(engine.click_count("openImportButton"), 1);
    assert!(engine.is_visible("importDialog"));
}

#[test]
fn test_click_on_vanished_element_is_stale() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);
    let button = find(&service, &session_id, "importProgramButton");

    engine.hide("importProgramButton");
    let result = service.click(Some(ElementRefRequest {
        element: Some(button),
    }));

    assert_eq!(result.error_kind(), Some(ErrorKind::StaleElement));
    assert_eq!(outcome_of(&result, "ResolveElement"), Some(Fail));
    assert!(result.step_log.find("Click").is_none());
    assert_eq!(engine.click_count("importProgramButton"), 0);
}

#[test]
fn test_click_without_element() {
    let (_, service) = demo_service();

    let result = service.double_click(Some(ElementRefRequest::default()));
    assert_eq!(result.error_kind(), Some(ErrorKind::InvalidArgument));
    assert_eq!(
        result.error.as_ref().map(|e| e.message.as_str()),
        Some("Element must be provided")
    );
}

#[test]
fn test_set_text_replace_and_append() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);
    let editor = find(&service, &session_id, "programEditor");

    let replaced = service.set_text(Some(SetTextRequest {
        element: Some(editor.clone()),
        text: "PROGRAM Main".to_string(),
        mode: "replace".to_string(),
    }));
    assert!(replaced.ok, "{:?}", replaced.error);
    let step = replaced.step_log.find("SetText").expect("SetText step");
    assert_eq!(step.param("mode"), Some("Replace"));
    assert_eq!(step.param("textLength"), Some("12"));
    assert_eq!(engine.content_of("programEditor").as_deref(), Some("PROGRAM Main"));

    let appended = service.set_text(Some(SetTextRequest {
        element: Some(editor),
        text: " END".to_string(),
        mode: "Append".to_string(),
    }));
    assert!(appended.ok, "{:?}", appended.error);
    assert_eq!(
        engine.content_of("programEditor").as_deref(),
        Some("PROGRAM Main END")
    );
}

#[test]
fn test_set_text_rejects_unknown_mode() {
    let (_, service) = demo_service();
    let session_id = open(&service, DEMO_PID);
    let editor = find(&service, &session_id, "programEditor");

    let result = service.set_text(Some(SetTextRequest {
        element: Some(editor),
        text: "x".to_string(),
        mode: "Overwrite".to_string(),
    }));

    let error = result.error.as_ref().expect("error");
    assert_eq!(error.kind, ErrorKind::InvalidArgument);
    assert_eq!(error.message, "Unsupported SetText mode");
    assert_eq!(error.detail("mode"), Some("Overwrite"));
    let validate = result.step_log.find("ValidateRequest").expect("validate");
    assert_eq!(validate.param("mode"), Some("Overwrite"));
}

#[test]
fn test_send_keys_chord_and_text() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);

    let chord = service.send_keys(Some(SendKeysRequest {
        session_id: session_id.clone(),
        keys: "ctrl + a".to_string(),
    }));
    assert!(chord.ok, "{:?}", chord.error);
    assert_eq!(
        chord.step_log.find("SendKeys").and_then(|s| s.param("kind")),
        Some("Chord")
    );
    assert!(engine.key_log().contains(&"CTRL+A".to_string()));

    let text = service.send_keys(Some(SendKeysRequest {
        session_id,
        keys: "hello".to_string(),
    }));
    assert!(text.ok);
    assert!(engine.typed_text().ends_with("hello"));
}

#[test]
fn test_send_keys_parse_failure() {
    let (_, service) = demo_service();
    let session_id = open(&service, DEMO_PID);

    let result = service.send_keys(Some(SendKeysRequest {
        session_id,
        keys: "CTRL+SHIFT".to_string(),
    }));

    let error = result.error.as_ref().expect("error");
    assert_eq!(error.kind, ErrorKind::InvalidArgument);
    assert_eq!(error.message, "Failed to parse keys");
    assert!(error.detail("error").is_some());
    assert_eq!(
        outline(&result),
        vec![
            s("ValidateRequest", Success),
            s("ResolveSession", Success),
            s("SendKeys", Fail),
        ]
    );
}

#[test]
fn test_wait_until_sees_delayed_element() {
    let (_, service) = demo_service();
    let session_id = open(&service, DEMO_PID);
    let build = find(&service, &session_id, "buildButton");
    assert!(service
        .click(Some(ElementRefRequest {
            element: Some(build),
        }))
        .ok);

    let result = service.wait_until(Some(WaitUntilRequest {
        session_id,
        timeout_ms: 3000,
        condition: Some(WaitCondition::new(
            WaitConditionKind::ElementExists,
            selector("buildSucceededIndicator"),
        )),
    }));

    assert!(result.ok, "{:?}", result.error);
    let step = result.step_log.find("WaitUntil").expect("wait step");
    assert_eq!(step.param("kind"), Some("ElementExists"));
}

#[test]
fn test_wait_until_times_out_and_requires_condition() {
    let (_, service) = demo_service();
    let session_id = open(&service, DEMO_PID);

    let timed_out = service.wait_until(Some(WaitUntilRequest {
        session_id: session_id.clone(),
        timeout_ms: 250,
        condition: Some(WaitCondition::new(
            WaitConditionKind::ElementExists,
            selector("programPasteIndicator"),
        )),
    }));
    assert_eq!(timed_out.error_kind(), Some(ErrorKind::TimeoutError));
    assert_eq!(
        timed_out.error.as_ref().map(|e| e.message.as_str()),
        Some("WaitUntil timed out")
    );

    let missing = service.wait_until(Some(WaitUntilRequest {
        session_id,
        timeout_ms: 250,
        condition: None,
    }));
    assert_eq!(
        missing.error.as_ref().map(|e| e.message.as_str()),
        Some("Condition must be provided")
    );
}

#[test]
fn test_wait_until_enabled_treats_missing_as_disabled() {
    let (engine, service) = demo_service();
    let session_id = open(&service, DEMO_PID);
    engine.set_enabled("buildButton", false);

    let condition = WaitCondition::new(WaitConditionKind::ElementEnabled, selector("buildButton"));
    let disabled = service.wait_until(Some(WaitUntilRequest {
        session_id: session_id.clone(),
        timeout_ms: 200,
        condition: Some(condition.clone()),
    }));
    assert_eq!(disabled.error_kind(), Some(ErrorKind::TimeoutError));

    engine.set_enabled("buildButton", true);
    let enabled = service.wait_until(Some(WaitUntilRequest {
        session_id,
        timeout_ms: 200,
        condition: Some(condition),
    }));
    assert!(enabled.ok);
}

#[test]
fn test_run_flow_unknown_name_lists_available() {
    let (_, service) = demo_service();

    let result = service.run_flow(Some(RunFlowRequest {
        session_id: "not-opened".to_string(),
        flow_name: "autothink.deploy".to_string(),
        ..Default::default()
    }));

    let error = result.error.as_ref().expect("error");
    assert_eq!(error.kind, ErrorKind::InvalidArgument);
    assert_eq!(error.message, "Unknown flow");
    assert!(error
        .detail("availableFlows")
        .is_some_and(|flows| flows.contains("autothink.build")));
    assert_eq!(
        outline(&result),
        vec![s("ValidateRequest", Success), s("DispatchFlow", Fail)]
    );
}

struct Placeholder;

impl Flow for Placeholder {
    fn name(&self) -> &str {
        "autothink.download"
    }

    fn is_implemented(&self) -> bool {
        false
    }

    fn run(&self, _ctx: &mut FlowContext, _args: Option<&serde_json::Value>) -> FlowOutcome {
        unreachable!("placeholder flows never run")
    }
}

struct Exploding;

impl Flow for Exploding {
    fn name(&self) -> &str {
        "test.explode"
    }

    fn run(&self, _ctx: &mut FlowContext, _args: Option<&serde_json::Value>) -> FlowOutcome {
        panic!("boom");
    }
}

#[test]
fn test_run_flow_placeholder_is_not_implemented() {
    let (_, service) = service_with_flows(FlowRegistry::builtin().with_flow(Box::new(Placeholder)));

    let result = service.run_flow(Some(RunFlowRequest {
        session_id: "not-opened".to_string(),
        flow_name: "autothink.download".to_string(),
        ..Default::default()
    }));

    assert_eq!(result.error_kind(), Some(ErrorKind::NotImplemented));
    assert_eq!(
        outline(&result),
        vec![
            s("ValidateRequest", Success),
            s("DispatchFlow", Success),
            s("NotImplemented", Fail),
        ]
    );
}

#[test]
fn test_run_flow_known_but_unregistered_is_not_implemented() {
    let (_, service) = service_with_flows(FlowRegistry::empty());

    let result = service.run_flow(Some(RunFlowRequest {
        session_id: "not-opened".to_string(),
        flow_name: "autothink.attach".to_string(),
        ..Default::default()
    }));

    assert_eq!(result.error_kind(), Some(ErrorKind::NotImplemented));
}

#[test]
fn test_run_flow_bad_args_json_fails_before_session() {
    let (_, service) = demo_service();

    let result = service.run_flow(Some(RunFlowRequest {
        session_id: "not-opened".to_string(),
        flow_name: "autothink.attach".to_string(),
        args_json: Some("{ not json".to_string()),
        ..Default::default()
    }));

    let error = result.error.as_ref().expect("error");
    assert_eq!(error.message, "Failed to parse ArgsJson");
    assert_eq!(error.detail("exceptionType"), Some("serde_json::Error"));
    assert_eq!(
        outline(&result),
        vec![
            s("ValidateRequest", Success),
            s("DispatchFlow", Success),
            s("ParseArgsJson", Fail),
        ]
    );
}

#[test]
fn test_run_flow_requires_open_session() {
    let (_, service) = demo_service();

    let result = service.run_flow(Some(RunFlowRequest {
        session_id: "not-opened".to_string(),
        flow_name: "autothink.attach".to_string(),
        ..Default::default()
    }));

    assert_eq!(result.error_kind(), Some(ErrorKind::ConfigError));
    assert_eq!(
        outline(&result),
        vec![
            s("ValidateRequest", Success),
            s("DispatchFlow", Success),
            s("ResolveSession", Fail),
        ]
    );
}

#[test]
fn test_run_flow_attach() {
    let (_, service) = demo_service();
    let session_id = open(&service, DEMO_PID);

    let result = service.run_flow(Some(RunFlowRequest {
        session_id,
        flow_name: "autothink.attach".to_string(),
        args_json: Some("{}".to_string()),
        ..Default::default()
    }));

    assert!(result.ok, "{:?}", result.error);
    let data = result.value.clone().and_then(|v| v.data).expect("data");
    assert_eq!(data["processId"], json!(DEMO_PID));
    assert_eq!(data["mainWindowTitle"], json!("AUTOTHINK Demo Target"));
    assert_eq!(
        step_ids(&result),
        vec![
            "ValidateRequest",
            "DispatchFlow",
            "ParseArgsJson",
            "ResolveSession",
            "GetMainWindow",
            "BringToForeground",
        ]
    );
}

#[test]
fn test_run_flow_panic_becomes_flow_exception() {
    let (_, service) = service_with_flows(FlowRegistry::builtin().with_flow(Box::new(Exploding)));
    let session_id = open(&service, DEMO_PID);

    let result = service.run_flow(Some(RunFlowRequest {
        session_id,
        flow_name: "test.explode".to_string(),
        ..Default::default()
    }));

    let error = result.error.as_ref().expect("error");
    assert_eq!(error.kind, ErrorKind::ActionError);
    assert_eq!(error.message, "Flow execution failed");
    assert_eq!(error.detail("exceptionMessage"), Some("boom"));
    assert_eq!(result.step_log.last().map(|s| s.step_id.as_str()), Some("FlowException"));
}

#[test]
fn test_bring_to_foreground_refusal_is_warning() {
    let tree = r#"{
        "processes": [{
            "pid": 7,
            "name": "Stubborn",
            "mainWindow": { "name": "Stubborn", "controlType": "Window", "activateFails": true }
        }]
    }"#;
    let (_, service) = service_for(tree);

    let result = service.open_session(Some(OpenSessionRequest {
        process_id: Some(7),
        timeout_ms: 500,
        ..Default::default()
    }));

    assert!(result.ok);
    assert_eq!(outcome_of(&result, "BringToForeground"), Some(Warning));
}

#[test]
fn test_handle_routes_and_reports_wire_errors() {
    let (_, service) = demo_service();

    let pong = service
        .handle(&JsonRpcRequest::call_without_args(1, "Ping"))
        .expect("reply");
    assert_eq!(pong.result, Some(json!("pong")));

    let unknown = service
        .handle(&JsonRpcRequest::call_without_args(2, "Reboot"))
        .expect("reply");
    assert!(unknown.is_method_not_found());
    assert_eq!(unknown.error.as_ref().map(|e| e.code), Some(METHOD_NOT_FOUND));

    let bad = service
        .handle(&JsonRpcRequest::call(
            3,
            "OpenSession",
            json!({ "processId": "not a number" }),
        ))
        .expect("reply");
    assert_eq!(bad.error.as_ref().map(|e| e.code), Some(INVALID_PARAMS));

    let opened = service
        .handle(&JsonRpcRequest::call(
            4,
            "OpenSession",
            json!({ "processId": DEMO_PID, "timeoutMs": 1000 }),
        ))
        .expect("reply");
    let result = opened.result.expect("result");
    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["value"]["processId"], json!(DEMO_PID));
    assert_eq!(result["stepLog"]["steps"][0]["stepId"], json!("ValidateRequest"));
}

#[test]
fn test_handle_notification_gets_no_reply() {
    let (_, service) = demo_service();

    let mut request = JsonRpcRequest::call(
        0,
        "OpenSession",
        json!({ "processId": DEMO_PID, "timeoutMs": 1000 }),
    );
    request.id = None;

    assert!(service.handle(&request).is_none());
    assert_eq!(service.sessions().len(), 1);
}

#[test]
fn test_main_window_lookup_for_vanished_process_times_out() {
    let (engine, _service) = demo_service();
    let session = uiaflow::session::Session::new(9999, None, std::sync::Arc::new(engine));

    let error = session
        .main_window(std::time::Duration::from_millis(50))
        .expect_err("no such process");

    assert!(matches!(error, uiaflow::AutomationError::Timeout(_)), "{error:?}");
    assert_eq!(error.type_name(), "Timeout");
    assert_eq!(error.to_string(), "Operation timed out: Main window not found.");
}
