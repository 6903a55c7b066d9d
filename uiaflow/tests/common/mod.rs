#![allow(dead_code)]

use serde_json::Value;
use std::sync::Arc;
use uiaflow::platforms::memory::MemoryEngine;
use uiaflow::rpc::{OpenSessionRequest, RunFlowRequest, RunFlowResponse, RpcResult};
use uiaflow::{FlowRegistry, StepOutcome, UiaRpcService};

pub const DEMO_PID: u32 = 4242;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("uiaflow=debug")
        .with_test_writer()
        .try_init();
}

/// Demo tree engine plus a service sharing its state
pub fn demo_service() -> (MemoryEngine, UiaRpcService) {
    init_tracing();
    let engine = MemoryEngine::demo().expect("demo tree parses");
    let service = UiaRpcService::new(Arc::new(engine.clone()));
    (engine, service)
}

pub fn service_for(tree: &str) -> (MemoryEngine, UiaRpcService) {
    init_tracing();
    let engine = MemoryEngine::from_json(tree).expect("tree parses");
    let service = UiaRpcService::new(Arc::new(engine.clone()));
    (engine, service)
}

pub fn service_with_flows(flows: FlowRegistry) -> (MemoryEngine, UiaRpcService) {
    init_tracing();
    let engine = MemoryEngine::demo().expect("demo tree parses");
    let service = UiaRpcService::with_flows(Arc::new(engine.clone()), flows);
    (engine, service)
}

/// Opens a session on the first process of the tree by pid.
pub fn open(service: &UiaRpcService, pid: u32) -> String {
    let result = service.open_session(Some(OpenSessionRequest {
        process_id: Some(pid),
        timeout_ms: 1000,
        ..Default::default()
    }));
    assert!(result.ok, "OpenSession failed: {:?}", result.error);
    result.value.expect("session value").session_id
}

pub fn run_flow(
    service: &UiaRpcService,
    session_id: &str,
    flow_name: &str,
    args: Value,
) -> RpcResult<RunFlowResponse> {
    service.run_flow(Some(RunFlowRequest {
        session_id: session_id.to_string(),
        flow_name: flow_name.to_string(),
        args: Some(args),
        timeout_ms: 5000,
        ..Default::default()
    }))
}

pub fn outline<T>(result: &RpcResult<T>) -> Vec<(String, StepOutcome)> {
    result.step_log.outline()
}

pub fn step_ids<T>(result: &RpcResult<T>) -> Vec<String> {
    result
        .step_log
        .steps
        .iter()
        .map(|s| s.step_id.clone())
        .collect()
}

pub fn outcome_of<T>(result: &RpcResult<T>, step_id: &str) -> Option<StepOutcome> {
    result.step_log.find(step_id).map(|s| s.outcome)
}

/// Selector JSON for a single descendant step matching an automation id
pub fn by_id(automation_id: &str) -> Value {
    serde_json::json!({ "path": [{ "automationId": automation_id }] })
}

pub fn s(id: &str, outcome: StepOutcome) -> (String, StepOutcome) {
    (id.to_string(), outcome)
}
