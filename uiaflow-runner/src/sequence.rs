//! The configured run: attach, import variables, import program, build.
//!
//! Every exit path writes `summary.json` and, unless disabled, the evidence
//! pack. Flows that never ran still get a `NotRun` summary entry.

use crate::args::{self, normalize_root, popups_needed, ArgsError};
use crate::client::{AgentRpc, RpcChannel};
use crate::config::{resolve_path, RunnerConfig};
use crate::connectivity::{self, ConnectivityReport};
use crate::evidence;
use crate::exit_code;
use crate::inputs::{self, ResolvedInputs};
use crate::profiles::{load_profile, LoadedProfile, ProfileError, SelectorKeyIndex, POPUP_PROFILE_FLOW};
use crate::recovery::{RecoveryStage, UiStateRecovery};
use crate::reports::{
    self, build_outcome_report, create_summary, write_json, write_step_log, BuildSummary, FlowRunResult,
    FlowRunSummary, InputsSourceSummary, RunSummary, NOT_RUN, SKIPPED_AFTER_FAILURE, SKIPPED_BY_CONFIG,
};
use crate::selector_check;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uiaflow::flows::names;
use uiaflow::rpc::{ErrorKind, OpenSessionRequest, RpcError, RpcResult, RunFlowRequest, RunFlowResponse};
use uiaflow::{AccessibilityEngine, StepLog};

pub const STOPPED_SELECTOR_CHECK: &str = "selectorCheckFailed";
pub const STOPPED_INPUTS: &str = "flowFailed:inputsSource";
pub const SKIPPED_CONNECTIVITY: &str = "Skipped due to connectivity failure";

/// Extra client-side wait on top of a call's own timeout
const CALL_GRACE_MS: u64 = 5_000;
const CLOSE_SESSION_TIMEOUT_MS: u64 = 5_000;
const ATTACH_ROOT: &str = "mainWindow";

/// Everything a run needs besides the agent channel
#[derive(Debug, Clone)]
pub struct SequenceOptions {
    pub config: RunnerConfig,
    /// Relative paths in the config resolve against this directory
    pub config_dir: PathBuf,
    pub selectors_root: PathBuf,
    pub profile: String,
    pub run_dir: PathBuf,
    pub agent_path: String,
    pub check_timeout_ms: u64,
    pub skip_check: bool,
}

#[derive(Debug, Clone)]
pub struct SequenceOutcome {
    pub exit_code: i32,
    pub run_dir: PathBuf,
    pub summary: RunSummary,
}

/// The four flow profiles, loaded up front
#[derive(Debug, Clone)]
pub struct FlowProfiles {
    pub attach: LoadedProfile,
    pub import_variables: LoadedProfile,
    pub import_program: LoadedProfile,
    pub build: LoadedProfile,
}

impl FlowProfiles {
    pub fn load(root: &Path, profile: &str, pack_version: Option<&str>) -> Result<Self, ProfileError> {
        Ok(Self {
            attach: load_profile(root, profile, names::ATTACH, pack_version)?,
            import_variables: load_profile(root, profile, names::IMPORT_VARIABLES, pack_version)?,
            import_program: load_profile(root, profile, names::IMPORT_PROGRAM_TEXT_PASTE, pack_version)?,
            build: load_profile(root, profile, names::BUILD, pack_version)?,
        })
    }

    pub fn by_flow(&self) -> [(&'static str, &LoadedProfile); 4] {
        [
            (names::ATTACH, &self.attach),
            (names::IMPORT_VARIABLES, &self.import_variables),
            (names::IMPORT_PROGRAM_TEXT_PASTE, &self.import_program),
            (names::BUILD, &self.build),
        ]
    }
}

struct RunState<'a> {
    options: &'a SequenceOptions,
    flows: Vec<FlowRunSummary>,
    stopped_because: Option<String>,
    connectivity: Option<(ConnectivityReport, Option<PathBuf>)>,
    inputs: Option<InputsSourceSummary>,
    build: Option<BuildSummary>,
    recovery: Option<UiStateRecovery>,
}

impl<'a> RunState<'a> {
    fn new(options: &'a SequenceOptions) -> Self {
        Self {
            options,
            flows: Vec::new(),
            stopped_because: None,
            connectivity: None,
            inputs: None,
            build: None,
            recovery: None,
        }
    }

    fn config(&self) -> &'a RunnerConfig {
        &self.options.config
    }

    fn run_dir(&self) -> &'a Path {
        &self.options.run_dir
    }

    fn write_report<T: Serialize>(&self, file_name: &str, value: &T) -> Option<PathBuf> {
        let path = self.run_dir().join(file_name);
        match write_json(&path, value) {
            Ok(()) => Some(path),
            Err(e) => {
                warn!("failed to write {}: {e}", path.display());
                None
            }
        }
    }

    fn stop(&mut self, reason: impl Into<String>) {
        self.stopped_because = Some(reason.into());
    }

    /// Adds `NotRun` entries for the flows after attach that have no entry yet.
    fn append_not_run(&mut self, profiles: &FlowProfiles, due_to_failure: bool) {
        let config = self.config();
        let pending = [
            (
                names::IMPORT_VARIABLES,
                config.skip_import_variables,
                config.import_variables.search_root.as_deref(),
                &profiles.import_variables,
            ),
            (
                names::IMPORT_PROGRAM_TEXT_PASTE,
                config.skip_import_program,
                config.import_program.search_root.as_deref(),
                &profiles.import_program,
            ),
            (
                names::BUILD,
                config.skip_build,
                config.build.search_root.as_deref(),
                &profiles.build,
            ),
        ];
        for (name, skipped, root, profile) in pending {
            if self.flows.iter().any(|f| f.name == name) {
                continue;
            }
            let reason = if due_to_failure && !skipped {
                SKIPPED_AFTER_FAILURE
            } else {
                SKIPPED_BY_CONFIG
            };
            self.flows.push(FlowRunSummary::not_run(
                name,
                reason,
                normalize_root(root),
                profile.selectors_file(),
            ));
        }
    }

    /// Records a flow result; returns the exit code when the run must stop.
    fn record(&mut self, summary: FlowRunSummary, profiles: &FlowProfiles, exit_code: i32) -> Option<i32> {
        let failed = !summary.ok;
        let name = summary.name.clone();
        self.flows.push(summary);
        if failed && !self.config().allow_partial {
            self.stop(format!("flowFailed:{name}"));
            self.append_not_run(profiles, true);
            return Some(exit_code);
        }
        None
    }

    fn finish(self, exit_code: i32) -> SequenceOutcome {
        let run_dir = self.run_dir();
        let recovery_summary = self.recovery.as_ref().map(|recovery| {
            let path = recovery
                .write_report(run_dir)
                .inspect_err(|e| warn!("failed to write UI state recovery report: {e}"))
                .ok();
            recovery.summary(path.as_deref())
        });

        let (connectivity_ok, failed_reason, hint, report_path) = match &self.connectivity {
            Some((report, path)) => (
                report.ok,
                report.failure_message().map(str::to_string),
                report.hint().map(str::to_string),
                path.as_ref().map(|p| p.display().to_string()),
            ),
            None => (false, None, None, None),
        };

        let summary = RunSummary {
            profile: self.options.profile.clone(),
            run_dir: run_dir.display().to_string(),
            flows: self.flows,
            generated_at_utc: Utc::now(),
            connectivity_ok,
            connectivity_failed_reason: failed_reason,
            connectivity_hint: hint,
            connectivity_report: report_path,
            stopped_because: self.stopped_because,
            inputs_source: self.inputs,
            build: self.build,
            ui_state_recovery: recovery_summary,
        };

        let summary_path = run_dir.join(reports::SUMMARY_FILE);
        match write_json(&summary_path, &summary) {
            Ok(()) => info!("Summary written: {}", summary_path.display()),
            Err(e) => error!("failed to write summary {}: {e}", summary_path.display()),
        }

        if self.options.config.evidence_pack.enable {
            let runner_steps = self
                .recovery
                .as_ref()
                .map(|r| r.runner_steps().to_vec())
                .unwrap_or_default();
            match evidence::write_pack(run_dir, &summary, &runner_steps) {
                Ok(pack) => info!("EvidencePack: {}", pack.pack_dir.display()),
                Err(e) => warn!("failed to write evidence pack: {e}"),
            }
        }

        SequenceOutcome {
            exit_code,
            run_dir: run_dir.to_path_buf(),
            summary,
        }
    }
}

/// Runs the whole sequence over an agent channel that has not done its
/// handshake yet. The caller owns the channel and shuts it down afterwards.
///
/// `recovery_engine` is the runner's own view of the desktop; without one,
/// UI state recovery is skipped even when enabled.
pub async fn run_sequence<C: RpcChannel>(
    rpc: &mut AgentRpc<C>,
    options: &SequenceOptions,
    recovery_engine: Option<Arc<dyn AccessibilityEngine>>,
) -> SequenceOutcome {
    let mut state = RunState::new(options);
    let config = &options.config;
    let pack_version = config.pack_version();
    info!("SelectorPackVersion: {}", pack_version.unwrap_or("(default)"));

    let profiles = match FlowProfiles::load(&options.selectors_root, &options.profile, pack_version) {
        Ok(profiles) => profiles,
        Err(e) => {
            error!("Selector profile load failed: {e}");
            state.flows.push(FlowRunSummary::failed(
                names::ATTACH,
                ErrorKind::ConfigError.as_str(),
                e.to_string(),
                ATTACH_ROOT,
                Path::new(""),
            ));
            state.stop(STOPPED_SELECTOR_CHECK);
            return state.finish(exit_code::CHECK_FAILED);
        }
    };

    let check = selector_check::check(pack_version, &profiles.by_flow());
    if let Some(path) = state.write_report(selector_check::REPORT_FILE, &check) {
        info!("SelectorCheck: {}", path.display());
    }
    if !check.ok() {
        error!("{}", check.failure_message());
        state.flows.push(FlowRunSummary::failed(
            names::ATTACH,
            ErrorKind::ConfigError.as_str(),
            check.failure_message(),
            ATTACH_ROOT,
            profiles.attach.selectors_file(),
        ));
        state.stop(STOPPED_SELECTOR_CHECK);
        state.append_not_run(&profiles, true);
        return state.finish(exit_code::CHECK_FAILED);
    }

    let working_dir = std::env::current_dir()
        .map(|d| d.display().to_string())
        .unwrap_or_default();
    let report = connectivity::check(rpc, &options.agent_path, &working_dir, options.check_timeout_ms).await;
    let report_path = state.write_report(connectivity::REPORT_FILE, &report);
    let connectivity_ok = report.ok;
    state.connectivity = Some((report, report_path));
    if !connectivity_ok && !options.skip_check {
        state.flows.push(FlowRunSummary::not_run(
            names::ATTACH,
            SKIPPED_CONNECTIVITY,
            ATTACH_ROOT,
            profiles.attach.selectors_file(),
        ));
        state.append_not_run(&profiles, true);
        return state.finish(exit_code::CHECK_FAILED);
    }

    let session = match open_session(rpc, config).await {
        Ok(session) => session,
        Err(failure) => {
            let mut summary = FlowRunSummary::failed(
                names::ATTACH,
                &failure.kind,
                failure.message,
                ATTACH_ROOT,
                profiles.attach.selectors_file(),
            );
            summary.failed_step_id = Some("OpenSession".to_string());
            state.flows.push(summary);
            state.append_not_run(&profiles, true);
            return state.finish(exit_code::CHECK_FAILED);
        }
    };
    info!("Session {} attached to process {}", session.session_id, session.process_id);

    let recovery_config = &config.ui_state_recovery;
    if recovery_config.enable {
        match recovery_engine {
            Some(engine) => {
                state.recovery = Some(UiStateRecovery::new(
                    engine,
                    session.process_id,
                    &profiles.attach,
                    &recovery_config.search_root,
                    recovery_config.max_attempts,
                ));
            }
            None => warn!("UI state recovery enabled but no local engine is available; skipping it"),
        }
    }

    let code = run_flows(rpc, &mut state, &profiles, &session.session_id).await;

    match rpc.close_session(&session.session_id, CLOSE_SESSION_TIMEOUT_MS).await {
        Ok(result) if !result.ok => debug!("CloseSession reported {:?}", result.error),
        Ok(_) => {}
        Err(e) => debug!("CloseSession failed: {e}"),
    }

    state.finish(code)
}

struct SessionFailure {
    kind: String,
    message: String,
}

struct OpenedSession {
    session_id: String,
    process_id: u32,
}

async fn open_session<C: RpcChannel>(
    rpc: &mut AgentRpc<C>,
    config: &RunnerConfig,
) -> Result<OpenedSession, SessionFailure> {
    let session = &config.session;
    let request = OpenSessionRequest {
        process_id: session.process_id,
        process_name: session.process_name.clone(),
        main_window_title_contains: session.main_window_title_contains.clone(),
        timeout_ms: if session.timeout_ms > 0 { session.timeout_ms } else { 10_000 },
        bring_to_foreground: session.bring_to_foreground,
    };
    let timeout = request.timeout_ms as u64 + CALL_GRACE_MS;

    let result = rpc.open_session(&request, timeout).await.map_err(|e| {
        error!("OpenSession failed: {e}");
        SessionFailure {
            kind: ErrorKind::RpcError.as_str().to_string(),
            message: e.to_string(),
        }
    })?;

    match (result.ok, result.value) {
        (true, Some(value)) => Ok(OpenedSession {
            session_id: value.session_id,
            process_id: value.process_id,
        }),
        (_, _) => {
            let error = result.error;
            Err(SessionFailure {
                kind: error
                    .as_ref()
                    .map(|e| e.kind.as_str())
                    .unwrap_or(ErrorKind::ConfigError.as_str())
                    .to_string(),
                message: error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "OpenSession failed".to_string()),
            })
        }
    }
}

async fn run_flows<C: RpcChannel>(
    rpc: &mut AgentRpc<C>,
    state: &mut RunState<'_>,
    profiles: &FlowProfiles,
    session_id: &str,
) -> i32 {
    let options = state.options;
    let config = &options.config;
    let timeout_ms = config.flow_timeout_ms();
    let call = FlowCall {
        run_dir: &options.run_dir,
        session_id,
        timeout_ms,
    };

    let attach = run_flow_logged(rpc, &call, names::ATTACH, None).await;
    let attach_summary = create_summary(
        names::ATTACH,
        &attach,
        ATTACH_ROOT,
        profiles.attach.selectors_file(),
        &SelectorKeyIndex::from_profile(&profiles.attach),
    );
    state.flows.push(attach_summary.clone());
    if !attach_summary.ok {
        state.stop(format!("flowFailed:{}", names::ATTACH));
        state.append_not_run(profiles, true);
        return exit_code::ATTACH_FAILED;
    }

    let run_import_variables = !config.skip_import_variables;
    let run_import_program = !config.skip_import_program;
    let run_build = !config.skip_build;

    let popups = if popups_needed(
        run_import_variables.then_some(&config.import_variables),
        run_import_program.then_some(&config.import_program),
        run_build.then_some(&config.build),
    ) {
        load_profile(&options.selectors_root, &options.profile, POPUP_PROFILE_FLOW, config.pack_version())
            .inspect_err(|e| warn!("popup profile not loaded: {e}"))
            .ok()
    } else {
        None
    };

    let resolved = inputs::resolve_inputs(config, &options.config_dir);
    let resolved_path = state.write_report(inputs::REPORT_FILE, &resolved);
    state.inputs = Some(InputsSourceSummary {
        mode: resolved.mode.clone(),
        comm_ir_path: resolved.comm_ir_path.as_ref().map(|p| p.display().to_string()),
        resolved_inputs_path: resolved_path.map(|p| p.display().to_string()),
        warnings: resolved.warnings.clone(),
    });
    if !resolved.ok {
        let message = resolved
            .error_message()
            .unwrap_or("inputsSource resolution failed")
            .to_string();
        error!("Inputs resolution failed: {message}");
        state.flows.push(FlowRunSummary::failed(
            names::IMPORT_VARIABLES,
            resolved
                .error
                .as_ref()
                .map(|e| e.kind.as_str())
                .unwrap_or(ErrorKind::InvalidArgument.as_str()),
            message,
            normalize_root(config.import_variables.search_root.as_deref()),
            profiles.import_variables.selectors_file(),
        ));
        state.stop(STOPPED_INPUTS);
        state.append_not_run(profiles, true);
        return exit_code::IMPORT_VARIABLES_FAILED;
    }

    let import_variables_root = normalize_root(config.import_variables.search_root.as_deref());
    if run_import_variables {
        let summary = match import_variables_args(config, &options.config_dir, &resolved, profiles, popups.as_ref()) {
            Ok(args) => {
                let run = run_flow_with_recovery(rpc, &call, state.recovery.as_mut(), names::IMPORT_VARIABLES, args).await;
                create_summary(
                    names::IMPORT_VARIABLES,
                    &run,
                    import_variables_root,
                    profiles.import_variables.selectors_file(),
                    &SelectorKeyIndex::from_profile(&profiles.import_variables),
                )
            }
            Err(message) => invalid_argument(
                names::IMPORT_VARIABLES,
                message,
                import_variables_root,
                &profiles.import_variables,
            ),
        };
        if let Some(code) = state.record(summary, profiles, exit_code::IMPORT_VARIABLES_FAILED) {
            return code;
        }
    } else {
        state.flows.push(FlowRunSummary::not_run(
            names::IMPORT_VARIABLES,
            SKIPPED_BY_CONFIG,
            import_variables_root,
            profiles.import_variables.selectors_file(),
        ));
    }

    let import_program_root = normalize_root(config.import_program.search_root.as_deref());
    if run_import_program {
        let summary = match import_program_args(config, &resolved, profiles, popups.as_ref()) {
            Ok(args) => {
                let run = run_flow_with_recovery(
                    rpc,
                    &call,
                    state.recovery.as_mut(),
                    names::IMPORT_PROGRAM_TEXT_PASTE,
                    args,
                )
                .await;
                create_summary(
                    names::IMPORT_PROGRAM_TEXT_PASTE,
                    &run,
                    import_program_root,
                    profiles.import_program.selectors_file(),
                    &SelectorKeyIndex::from_profile(&profiles.import_program),
                )
            }
            Err(message) => invalid_argument(
                names::IMPORT_PROGRAM_TEXT_PASTE,
                message,
                import_program_root,
                &profiles.import_program,
            ),
        };
        if let Some(code) = state.record(summary, profiles, exit_code::IMPORT_PROGRAM_FAILED) {
            return code;
        }
    } else {
        state.flows.push(FlowRunSummary::not_run(
            names::IMPORT_PROGRAM_TEXT_PASTE,
            SKIPPED_BY_CONFIG,
            import_program_root,
            profiles.import_program.selectors_file(),
        ));
    }

    let build_root = normalize_root(config.build.search_root.as_deref());
    if run_build {
        let summary = match args::build_args(&config.build, &profiles.build, popups.as_ref()) {
            Err(ArgsError::MissingWaitCondition) => {
                error!("Build.WaitCondition is required.");
                state.flows.push(invalid_argument(
                    names::BUILD,
                    ArgsError::MissingWaitCondition.to_string(),
                    build_root,
                    &profiles.build,
                ));
                state.stop(format!("flowFailed:{}", names::BUILD));
                return exit_code::BUILD_CONFIG_INVALID;
            }
            Err(e) => invalid_argument(names::BUILD, e.to_string(), build_root, &profiles.build),
            Ok(build_args) => match to_args(&build_args) {
                Err(message) => invalid_argument(names::BUILD, message, build_root, &profiles.build),
                Ok(args) => {
                    let run = run_flow_with_recovery(rpc, &call, state.recovery.as_mut(), names::BUILD, args).await;
                    let outcome = build_outcome_report(&run.result.step_log);
                    let outcome_path = state.write_report(reports::BUILD_OUTCOME_FILE, &outcome);
                    info!("Build outcome: {}", outcome.outcome);
                    state.build = Some(BuildSummary {
                        outcome: outcome.outcome,
                        evidence_path: outcome_path.map(|p| p.display().to_string()),
                    });
                    create_summary(
                        names::BUILD,
                        &run,
                        build_root,
                        profiles.build.selectors_file(),
                        &SelectorKeyIndex::from_profile(&profiles.build),
                    )
                }
            },
        };
        if let Some(code) = state.record(summary, profiles, exit_code::BUILD_FAILED) {
            return code;
        }
    } else {
        state.flows.push(FlowRunSummary::not_run(
            names::BUILD,
            SKIPPED_BY_CONFIG,
            build_root,
            profiles.build.selectors_file(),
        ));
    }

    info!("Run completed: OK");
    exit_code::OK
}

fn invalid_argument(name: &str, message: String, root: &str, profile: &LoadedProfile) -> FlowRunSummary {
    error!("{name}: {message}");
    FlowRunSummary::failed(
        name,
        ErrorKind::InvalidArgument.as_str(),
        message,
        root,
        profile.selectors_file(),
    )
}

fn to_args<T: Serialize>(args: &T) -> Result<Value, String> {
    serde_json::to_value(args).map_err(|e| format!("failed to encode flow args: {e}"))
}

fn import_variables_args(
    config: &RunnerConfig,
    config_dir: &Path,
    resolved: &ResolvedInputs,
    profiles: &FlowProfiles,
    popups: Option<&LoadedProfile>,
) -> Result<Value, String> {
    let file_path = config
        .import_variables
        .file_path
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| resolve_path(p, config_dir))
        .or_else(|| resolved.variables_file_path.clone())
        .ok_or_else(|| "variablesFilePath is required".to_string())?;
    let args = args::import_variables_args(
        &config.import_variables,
        file_path.display().to_string(),
        &profiles.import_variables,
        popups,
    )
    .map_err(|e| e.to_string())?;
    to_args(&args)
}

fn import_program_args(
    config: &RunnerConfig,
    resolved: &ResolvedInputs,
    profiles: &FlowProfiles,
    popups: Option<&LoadedProfile>,
) -> Result<Value, String> {
    let path = resolved
        .program_text_path
        .as_ref()
        .ok_or_else(|| "programTextPath is required".to_string())?;
    let program_text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read programTextPath {}: {e}", path.display()))?;
    let args = args::import_program_args(&config.import_program, program_text, &profiles.import_program, popups)
        .map_err(|e| e.to_string())?;
    to_args(&args)
}

/// Per-run parameters of every `RunFlow` call
pub struct FlowCall<'a> {
    pub run_dir: &'a Path,
    pub session_id: &'a str,
    pub timeout_ms: i64,
}

/// Sends one `RunFlow` and writes its step log. Transport failures become
/// an `RpcError` result with an empty step log.
pub async fn run_flow_logged<C: RpcChannel>(
    rpc: &mut AgentRpc<C>,
    call: &FlowCall<'_>,
    flow_name: &str,
    args: Option<Value>,
) -> FlowRunResult {
    let request = RunFlowRequest {
        session_id: call.session_id.to_string(),
        flow_name: flow_name.to_string(),
        args_json: args.as_ref().map(Value::to_string),
        args,
        timeout_ms: call.timeout_ms,
    };
    let result: RpcResult<RunFlowResponse> = match rpc.run_flow(&request).await {
        Ok(result) => result,
        Err(e) => {
            error!("RunFlow {flow_name} failed: {e}");
            RpcResult::failure(RpcError::new(ErrorKind::RpcError, e.to_string()), StepLog::default())
        }
    };

    let log_file = write_step_log(call.run_dir, flow_name, &result.step_log)
        .inspect_err(|e| warn!("failed to write step log for {flow_name}: {e}"))
        .ok();
    if result.ok {
        info!("Flow ok: {flow_name}");
    } else {
        warn!("Flow failed: {flow_name}");
    }
    FlowRunResult { result, log_file }
}

fn should_recover(result: &RpcResult<RunFlowResponse>) -> bool {
    !result.ok && result.error_kind().is_some_and(|kind| kind.is_recoverable())
}

/// Preflight recovery pass, the flow, then up to `max_attempts` rounds of
/// recovery plus retry while the flow fails with a recoverable kind.
pub async fn run_flow_with_recovery<C: RpcChannel>(
    rpc: &mut AgentRpc<C>,
    call: &FlowCall<'_>,
    recovery: Option<&mut UiStateRecovery>,
    flow_name: &str,
    args: Value,
) -> FlowRunResult {
    let Some(recovery) = recovery else {
        return run_flow_logged(rpc, call, flow_name, Some(args)).await;
    };

    recovery.try_handle(flow_name, RecoveryStage::Preflight);
    let mut run = run_flow_logged(rpc, call, flow_name, Some(args.clone())).await;

    for attempt in 1..=recovery.max_attempts() {
        if !should_recover(&run.result) {
            break;
        }
        let Some(handled) = recovery.try_handle(flow_name, RecoveryStage::Retry(attempt)) else {
            break;
        };
        if !handled.success {
            run.result.ok = false;
            run.result.error = Some(handled.error.unwrap_or_else(|| {
                RpcError::new(
                    ErrorKind::UnexpectedUIState,
                    format!("UI state handler failed: {}", handled.handler_name),
                )
            }));
            return run;
        }
        info!("{flow_name}: retry {attempt} after {}", handled.handler_name);
        run = run_flow_logged(rpc, call, flow_name, Some(args.clone())).await;
    }
    run
}

/// `NotRun` entries in a summary
pub fn not_run_flows(summary: &RunSummary) -> impl Iterator<Item = &FlowRunSummary> {
    summary
        .flows
        .iter()
        .filter(|f| f.error_kind.as_deref() == Some(NOT_RUN))
}
