//! Demo scenario against the agent's built-in demo target: attach, paste a
//! program, import a variable table, build.

use crate::client::{AgentRpc, RpcChannel};
use crate::connectivity;
use crate::exit_code;
use crate::profiles::SelectorKeyIndex;
use crate::reports::{create_run_dir, create_summary, write_json, RunSummary, SUMMARY_FILE};
use crate::sequence::{run_flow_logged, FlowCall};
use chrono::{Local, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uiaflow::flows::build::BuildArgs;
use uiaflow::flows::common::DialogStep;
use uiaflow::flows::import_program::ImportProgramArgs;
use uiaflow::flows::import_variables::ImportVariablesArgs;
use uiaflow::flows::names;
use uiaflow::rpc::OpenSessionRequest;
use uiaflow::{ElementSelector, SelectorStep, WaitCondition, WaitConditionKind};

/// Process name of the demo target in the agent's memory engine
pub const DEMO_PROCESS_NAME: &str = "Autothink.DemoTarget";
pub const DEMO_PROFILE: &str = "demo";
const FLOW_TIMEOUT_MS: i64 = 30_000;
const SESSION_TIMEOUT_MS: i64 = 10_000;
const CALL_GRACE_MS: u64 = 5_000;

fn by_id(control_type: &str, automation_id: &str) -> ElementSelector {
    ElementSelector::single(
        SelectorStep::descendant()
            .with_control_type(control_type)
            .with_automation_id(automation_id)
            .with_index(0),
    )
}

pub fn import_program_args() -> ImportProgramArgs {
    ImportProgramArgs {
        program_text: format!(
            "// DEMO {}\r\nVAR\r\n  a : INT;\r\nEND_VAR\r\n",
            Local::now().to_rfc3339()
        ),
        editor_selector: Some(by_id("Edit", "programEditor")),
        after_paste_wait_ms: Some(1_000),
        verify_mode: Some("editorNotEmpty".to_string()),
        find_timeout_ms: Some(10_000),
        clipboard_timeout_ms: Some(2_000),
        verify_timeout_ms: Some(5_000),
        fallback_to_type: true,
        ..ImportProgramArgs::default()
    }
}

pub fn import_variables_args() -> ImportVariablesArgs {
    let dialog = by_id("Window", "importDialog");
    ImportVariablesArgs {
        file_path: Some(format!(r"C:\temp\vars-{}.xlsx", Utc::now().format("%Y%m%d%H%M%S"))),
        open_import_dialog_steps: vec![DialogStep {
            action: Some("Click".to_string()),
            selector: Some(by_id("Button", "openImportButton")),
            ..DialogStep::default()
        }],
        dialog_selector: Some(dialog.clone()),
        file_path_editor_selector: Some(by_id("Edit", "filePathEdit")),
        confirm_button_selector: Some(by_id("Button", "importOkButton")),
        success_condition: Some(WaitCondition::new(WaitConditionKind::ElementNotExists, dialog)),
        find_timeout_ms: Some(10_000),
        wait_timeout_ms: Some(10_000),
        ..ImportVariablesArgs::default()
    }
}

pub fn build_args() -> BuildArgs {
    let button = by_id("Button", "buildButton");
    BuildArgs {
        build_button_selector: Some(button.clone()),
        wait_condition: Some(WaitCondition::new(WaitConditionKind::ElementEnabled, button)),
        find_timeout_ms: Some(10_000),
        timeout_ms: Some(15_000),
        ..BuildArgs::default()
    }
}

fn to_args<T: Serialize>(args: &T) -> Option<Value> {
    serde_json::to_value(args)
        .inspect_err(|e| warn!("failed to encode demo args: {e}"))
        .ok()
}

#[derive(Debug, Clone)]
pub struct DemoOutcome {
    pub exit_code: i32,
    pub run_dir: Option<PathBuf>,
    pub summary: Option<RunSummary>,
}

/// Runs the demo over a channel that has not done its handshake yet. Flow
/// failures are reported in the summary; only setup failures change the
/// exit code.
pub async fn run_demo<C: RpcChannel>(
    rpc: &mut AgentRpc<C>,
    logs_root: &Path,
    agent_path: &str,
    check_timeout_ms: u64,
    skip_check: bool,
) -> DemoOutcome {
    let run_dir = match create_run_dir(logs_root) {
        Ok(dir) => dir,
        Err(e) => {
            error!("failed to create run directory under {}: {e}", logs_root.display());
            return DemoOutcome {
                exit_code: exit_code::CONFIG_ERROR,
                run_dir: None,
                summary: None,
            };
        }
    };
    info!("RunDir: {}", run_dir.display());
    let setup_failed = |exit_code| DemoOutcome {
        exit_code,
        run_dir: Some(run_dir.clone()),
        summary: None,
    };

    let working_dir = std::env::current_dir()
        .map(|d| d.display().to_string())
        .unwrap_or_default();
    let report = connectivity::check(rpc, agent_path, &working_dir, check_timeout_ms).await;
    if let Err(e) = write_json(&run_dir.join(connectivity::REPORT_FILE), &report) {
        warn!("failed to write connectivity report: {e}");
    }
    if !report.ok && !skip_check {
        error!("Connectivity failed: {}", report.failure_message().unwrap_or_default());
        return setup_failed(exit_code::CHECK_FAILED);
    }

    let request = OpenSessionRequest {
        process_name: Some(DEMO_PROCESS_NAME.to_string()),
        timeout_ms: SESSION_TIMEOUT_MS,
        bring_to_foreground: true,
        ..OpenSessionRequest::default()
    };
    let session = match rpc.open_session(&request, SESSION_TIMEOUT_MS as u64 + CALL_GRACE_MS).await {
        Ok(result) => match (result.ok, result.value) {
            (true, Some(value)) => value,
            _ => {
                error!("OpenSession failed: {:?}", result.error);
                return setup_failed(exit_code::CONFIG_ERROR);
            }
        },
        Err(e) => {
            error!("OpenSession failed: {e}");
            return setup_failed(exit_code::CONFIG_ERROR);
        }
    };
    info!("Demo session {} on process {}", session.session_id, session.process_id);

    let call = FlowCall {
        run_dir: &run_dir,
        session_id: &session.session_id,
        timeout_ms: FLOW_TIMEOUT_MS,
    };
    let no_keys = SelectorKeyIndex::default();
    let no_file = Path::new("");
    let scenario = [
        (names::ATTACH, None),
        (names::IMPORT_PROGRAM_TEXT_PASTE, to_args(&import_program_args())),
        (names::IMPORT_VARIABLES, to_args(&import_variables_args())),
        (names::BUILD, to_args(&build_args())),
    ];

    let mut flows = Vec::with_capacity(scenario.len());
    for (flow_name, args) in scenario {
        let run = run_flow_logged(rpc, &call, flow_name, args).await;
        flows.push(create_summary(flow_name, &run, "mainWindow", no_file, &no_keys));
    }

    if let Err(e) = rpc.close_session(&session.session_id, CALL_GRACE_MS).await {
        warn!("CloseSession failed: {e}");
    }

    let summary = RunSummary {
        profile: DEMO_PROFILE.to_string(),
        run_dir: run_dir.display().to_string(),
        flows,
        generated_at_utc: Utc::now(),
        connectivity_ok: report.ok,
        connectivity_failed_reason: report.failure_message().map(str::to_string),
        connectivity_hint: report.hint().map(str::to_string),
        connectivity_report: Some(run_dir.join(connectivity::REPORT_FILE).display().to_string()),
        stopped_because: None,
        inputs_source: None,
        build: None,
        ui_state_recovery: None,
    };
    let summary_path = run_dir.join(SUMMARY_FILE);
    match write_json(&summary_path, &summary) {
        Ok(()) => info!("Summary written: {}", summary_path.display()),
        Err(e) => error!("failed to write summary: {e}"),
    }

    DemoOutcome {
        exit_code: exit_code::OK,
        run_dir: Some(run_dir),
        summary: Some(summary),
    }
}
