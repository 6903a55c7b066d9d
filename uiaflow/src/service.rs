//! The RPC boundary of the automation host.
//!
//! Every method validates its request, records each step it takes in a
//! [`StepLog`], and answers with an [`RpcResult`]. Element references are
//! re-resolved from their selector on each call; nothing is cached between
//! requests except the open sessions.

use crate::element::UIElement;
use crate::errors::AutomationError;
use crate::finder;
use crate::flows::common::{evaluate_in, poll_find, set_text_on_element};
use crate::flows::{FlowContext, FlowFailure, FlowRegistry, Lookup};
use crate::keys;
use crate::platforms::{AccessibilityEngine, ProcessInfo};
use crate::rpc::envelope::{INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND};
use crate::rpc::{
    create_error, map_find_failure, methods, CloseSessionRequest, ElementRef, ElementRefRequest,
    Empty, ErrorKind, FindElementRequest, FindElementResponse, JsonRpcRequest, JsonRpcResponse,
    OpenSessionRequest, OpenSessionResponse, RpcError, RpcResult, RunFlowRequest,
    RunFlowResponse, SendKeysRequest, SetTextMode, SetTextRequest, WaitUntilRequest,
    DEFAULT_FIND_TIMEOUT_MS, DEFAULT_OPEN_SESSION_TIMEOUT_MS, DEFAULT_RUN_FLOW_TIMEOUT_MS,
};
use crate::session::{Session, SessionRegistry};
use crate::step_log::{OpenStep, StepLog};
use crate::waiter::{self, DEFAULT_POLL_INTERVAL};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Main-window lookup budget when re-resolving an element reference
const RESOLVE_MAIN_WINDOW_TIMEOUT: Duration = Duration::from_millis(2_000);
/// Budget for the best-effort focus before `SendKeys`
const SEND_KEYS_FOCUS_TIMEOUT: Duration = Duration::from_millis(1_000);
const PROCESS_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Serves the RPC methods against one accessibility engine.
pub struct UiaRpcService {
    engine: Arc<dyn AccessibilityEngine>,
    sessions: SessionRegistry,
    flows: FlowRegistry,
}

impl UiaRpcService {
    pub fn new(engine: Arc<dyn AccessibilityEngine>) -> Self {
        Self::with_flows(engine, FlowRegistry::builtin())
    }

    pub fn with_flows(engine: Arc<dyn AccessibilityEngine>, flows: FlowRegistry) -> Self {
        Self {
            engine,
            sessions: SessionRegistry::new(),
            flows,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn flows(&self) -> &FlowRegistry {
        &self.flows
    }

    pub fn ping(&self) -> &'static str {
        "pong"
    }

    pub fn open_session(&self, request: Option<OpenSessionRequest>) -> RpcResult<OpenSessionResponse> {
        let mut log = StepLog::new();
        let outcome = self.open_session_steps(&mut log, request);
        finish(outcome, log)
    }

    pub fn close_session(&self, request: Option<CloseSessionRequest>) -> RpcResult<Empty> {
        let mut log = StepLog::new();
        let outcome = self.close_session_steps(&mut log, request);
        finish(outcome, log)
    }

    pub fn find_element(&self, request: Option<FindElementRequest>) -> RpcResult<FindElementResponse> {
        let mut log = StepLog::new();
        let outcome = self.find_element_steps(&mut log, request);
        finish(outcome, log)
    }

    pub fn click(&self, request: Option<ElementRefRequest>) -> RpcResult<Empty> {
        self.element_action(request, "Click", |element| element.click())
    }

    pub fn double_click(&self, request: Option<ElementRefRequest>) -> RpcResult<Empty> {
        self.element_action(request, "DoubleClick", |element| element.double_click())
    }

    pub fn right_click(&self, request: Option<ElementRefRequest>) -> RpcResult<Empty> {
        self.element_action(request, "RightClick", |element| element.right_click())
    }

    pub fn set_text(&self, request: Option<SetTextRequest>) -> RpcResult<Empty> {
        let mut log = StepLog::new();
        let outcome = self.set_text_steps(&mut log, request);
        finish(outcome, log)
    }

    pub fn send_keys(&self, request: Option<SendKeysRequest>) -> RpcResult<Empty> {
        let mut log = StepLog::new();
        let outcome = self.send_keys_steps(&mut log, request);
        finish(outcome, log)
    }

    pub fn wait_until(&self, request: Option<WaitUntilRequest>) -> RpcResult<Empty> {
        let mut log = StepLog::new();
        let outcome = self.wait_until_steps(&mut log, request);
        finish(outcome, log)
    }

    /// Runs a named flow. The step log always starts with `ValidateRequest`
    /// and `DispatchFlow`; flow steps follow `ResolveSession`.
    pub fn run_flow(&self, request: Option<RunFlowRequest>) -> RpcResult<RunFlowResponse> {
        let mut log = StepLog::new();
        match self.run_flow_steps(&mut log, request) {
            Ok(data) => RpcResult::success(RunFlowResponse { data: Some(data) }, log),
            Err(FlowFailure { error, data }) => RpcResult {
                ok: false,
                value: data.map(|data| RunFlowResponse { data: Some(data) }),
                error: Some(error),
                step_log: log,
            },
        }
    }

    /// Routes one JSON-RPC request. Notifications are executed but get no reply.
    pub fn handle(&self, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!("rpc call {}", request.method);
        let outcome = self.dispatch(request);
        if request.is_notification() {
            return None;
        }
        let id = request.id.clone();
        Some(match outcome {
            Ok(value) => JsonRpcResponse::result(id, value),
            Err(WireError { code, message }) => JsonRpcResponse::error(id, code, message),
        })
    }

    fn dispatch(&self, request: &JsonRpcRequest) -> Result<Value, WireError> {
        match request.method.as_str() {
            methods::PING => Ok(Value::from(self.ping())),
            methods::OPEN_SESSION => reply(self.open_session(argument(request)?)),
            methods::CLOSE_SESSION => reply(self.close_session(argument(request)?)),
            methods::FIND_ELEMENT => reply(self.find_element(argument(request)?)),
            methods::CLICK => reply(self.click(argument(request)?)),
            methods::DOUBLE_CLICK => reply(self.double_click(argument(request)?)),
            methods::RIGHT_CLICK => reply(self.right_click(argument(request)?)),
            methods::SET_TEXT => reply(self.set_text(argument(request)?)),
            methods::SEND_KEYS => reply(self.send_keys(argument(request)?)),
            methods::WAIT_UNTIL => reply(self.wait_until(argument(request)?)),
            methods::RUN_FLOW => reply(self.run_flow(argument(request)?)),
            other => Err(WireError {
                code: METHOD_NOT_FOUND,
                message: format!("Method not found: {other}"),
            }),
        }
    }

    fn open_session_steps(
        &self,
        log: &mut StepLog,
        request: Option<OpenSessionRequest>,
    ) -> Result<OpenSessionResponse, RpcError> {
        let request = validate(log, methods::OPEN_SESSION, request, |mut request, step| {
            if let Some(pid) = request.process_id {
                step.param("processId", pid);
            }
            if let Some(name) = &request.process_name {
                step.param("processName", name);
            }
            if let Some(title) = &request.main_window_title_contains {
                step.param("mainWindowTitleContains", title);
            }
            step.param("timeoutMs", request.timeout_ms)
                .param("bringToForeground", request.bring_to_foreground);

            let has_name = request
                .process_name
                .as_deref()
                .is_some_and(|n| !n.trim().is_empty());
            if request.process_id.is_none() && !has_name {
                return Err(RpcError::invalid_argument(
                    "ProcessId or ProcessName must be provided",
                ));
            }
            request.timeout_ms = timeout_or(request.timeout_ms, DEFAULT_OPEN_SESSION_TIMEOUT_MS) as i64;
            Ok(request)
        })?;

        match self.attach(log, &request) {
            Ok(response) => Ok(response),
            Err(e) => {
                let step = OpenStep::new("OpenSession", "Open session");
                Err(log.fail(
                    step,
                    create_error(ErrorKind::ConfigError, "OpenSession failed", &e),
                ))
            }
        }
    }

    /// `Attach` → `GetMainWindow` → `BringToForeground`; the session is only
    /// registered once the window is known.
    fn attach(
        &self,
        log: &mut StepLog,
        request: &OpenSessionRequest,
    ) -> Result<OpenSessionResponse, AutomationError> {
        let timeout = Duration::from_millis(request.timeout_ms as u64);

        let mut step = OpenStep::new("Attach", "Attach target process");
        let target = match request.process_id {
            Some(pid) => {
                step.param("processId", pid);
                Ok(ProcessInfo {
                    pid,
                    name: String::new(),
                    main_window_title: None,
                })
            }
            None => {
                let name = request.process_name.as_deref().unwrap_or_default().trim();
                step.param("processName", name);
                self.find_process(name, request.main_window_title_contains.as_deref(), timeout)
            }
        };
        let target = match target {
            Ok(target) => {
                log.succeed(step.with_param("resolvedProcessId", target.pid));
                target
            }
            Err(e) => {
                log.fail(step, create_error(ErrorKind::ConfigError, "Attach failed", &e));
                return Err(e);
            }
        };

        let session = Session::new(target.pid, target.main_window_title, Arc::clone(&self.engine));

        let step = OpenStep::new("GetMainWindow", "Get main window");
        let main_window = match session.main_window(timeout) {
            Ok(window) => {
                log.succeed(step);
                window
            }
            Err(e) => {
                log.fail(
                    step,
                    create_error(ErrorKind::ConfigError, "Failed to get main window", &e),
                );
                return Err(e);
            }
        };

        if request.bring_to_foreground {
            let step = OpenStep::new("BringToForeground", "Bring main window to foreground");
            match main_window.activate_window() {
                Ok(()) => log.succeed(step),
                Err(e) => log.warn(
                    step,
                    create_error(
                        ErrorKind::ActionError,
                        "Failed to bring window to foreground",
                        &e,
                    ),
                ),
            }
        }

        let title = session
            .main_window_title()
            .map(str::to_string)
            .unwrap_or_else(|| main_window.name());
        let session = self.sessions.insert(session);
        info!(
            "session {} opened for pid {}",
            session.id(),
            session.process_id()
        );

        Ok(OpenSessionResponse {
            session_id: session.id().to_string(),
            process_id: session.process_id(),
            main_window_title: Some(title),
        })
    }

    /// Picks a process by executable name, preferring one whose main window
    /// title contains `title_contains` (or any titled window when absent).
    fn find_process(
        &self,
        name: &str,
        title_contains: Option<&str>,
        timeout: Duration,
    ) -> Result<ProcessInfo, AutomationError> {
        let not_found = || AutomationError::ElementNotFound(format!("Process not found: {name}"));
        let wanted = title_contains
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        let pick = |candidates: &[ProcessInfo]| -> Option<ProcessInfo> {
            candidates
                .iter()
                .find(|p| {
                    let title = p.main_window_title.as_deref().unwrap_or_default();
                    match &wanted {
                        Some(wanted) => title.to_lowercase().contains(wanted.as_str()),
                        None => !title.trim().is_empty(),
                    }
                })
                .cloned()
        };

        let deadline = Instant::now() + timeout;
        let mut candidates = self.engine.find_processes(name)?;
        if candidates.is_empty() {
            return Err(not_found());
        }
        loop {
            if let Some(found) = pick(&candidates) {
                return Ok(found);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(PROCESS_POLL_INTERVAL.min(deadline - now));
            let refreshed = self.engine.find_processes(name)?;
            if refreshed.is_empty() {
                break;
            }
            candidates = refreshed;
        }

        debug!("no titled window matched for {name}; taking first process");
        candidates.into_iter().next().ok_or_else(not_found)
    }

    fn close_session_steps(
        &self,
        log: &mut StepLog,
        request: Option<CloseSessionRequest>,
    ) -> Result<Empty, RpcError> {
        let request = validate(log, methods::CLOSE_SESSION, request, |request, step| {
            step.param("sessionId", &request.session_id);
            require_session_id(&request.session_id)?;
            Ok(request)
        })?;

        let step = OpenStep::new("CloseSession", "Close session")
            .with_param("sessionId", &request.session_id);
        match self.sessions.remove(&request.session_id) {
            Some(session) => {
                info!("session {} closed", session.id());
                log.succeed(step);
                Ok(Empty {})
            }
            None => Err(log.fail(step, session_not_found(&request.session_id))),
        }
    }

    fn find_element_steps(
        &self,
        log: &mut StepLog,
        request: Option<FindElementRequest>,
    ) -> Result<FindElementResponse, RpcError> {
        let request = validate(log, methods::FIND_ELEMENT, request, |mut request, step| {
            step.param("sessionId", &request.session_id)
                .param("timeoutMs", request.timeout_ms);
            require_session_id(&request.session_id)?;
            request.timeout_ms = timeout_or(request.timeout_ms, DEFAULT_FIND_TIMEOUT_MS) as i64;
            Ok(request)
        })?;
        let timeout_ms = request.timeout_ms as u64;

        let session = self.resolve_session(log, &request.session_id)?;
        let main_window = get_main_window(log, &session, Duration::from_millis(timeout_ms))?;

        let step = OpenStep::new("FindElement", "Find element")
            .with_selector(Some(&request.selector))
            .with_param("timeoutMs", timeout_ms);
        match poll_find(&main_window, &request.selector, timeout_ms) {
            Ok(found) => {
                log.succeed(step.with_param("matched", found.matched));
                Ok(FindElementResponse {
                    element: ElementRef {
                        session_id: request.session_id,
                        selector: request.selector,
                        runtime_id: found.element.id(),
                        captured_at_utc: Utc::now(),
                    },
                })
            }
            Err(failure) => Err(log.fail(step, map_find_failure(&failure))),
        }
    }

    fn element_action<F>(&self, request: Option<ElementRefRequest>, action: &str, act: F) -> RpcResult<Empty>
    where
        F: FnOnce(&UIElement) -> Result<(), AutomationError>,
    {
        let mut log = StepLog::new();
        let outcome = self.element_action_steps(&mut log, request, action, act);
        finish(outcome, log)
    }

    fn element_action_steps<F>(
        &self,
        log: &mut StepLog,
        request: Option<ElementRefRequest>,
        action: &str,
        act: F,
    ) -> Result<Empty, RpcError>
    where
        F: FnOnce(&UIElement) -> Result<(), AutomationError>,
    {
        let element_ref = validate(log, action, request, |request, _| {
            request.element.ok_or_else(element_missing)
        })?;
        let element = self.resolve_element(log, &element_ref)?;

        let step = OpenStep::new(action, action).with_selector(Some(&element_ref.selector));
        match act(&element) {
            Ok(()) => {
                log.succeed(step);
                Ok(Empty {})
            }
            Err(e) => Err(log.fail(
                step,
                create_error(ErrorKind::ActionError, format!("{action} failed"), &e),
            )),
        }
    }

    fn set_text_steps(&self, log: &mut StepLog, request: Option<SetTextRequest>) -> Result<Empty, RpcError> {
        let (element_ref, text, mode) = validate(log, methods::SET_TEXT, request, |request, step| {
            step.param("mode", &request.mode);
            let element = request.element.ok_or_else(element_missing)?;
            let mode = SetTextMode::parse(Some(&request.mode)).ok_or_else(|| {
                RpcError::invalid_argument("Unsupported SetText mode").with_detail("mode", &request.mode)
            })?;
            let text = if request.text.trim().is_empty() {
                String::new()
            } else {
                request.text
            };
            Ok((element, text, mode))
        })?;
        let element = self.resolve_element(log, &element_ref)?;
        let engine = self.session_engine(&element_ref.session_id);

        let step = OpenStep::new("SetText", "SetText")
            .with_selector(Some(&element_ref.selector))
            .with_param("mode", mode.as_str())
            .with_param("textLength", text.chars().count());
        match set_text_on_element(engine.as_ref(), &element, &text, mode) {
            Ok(()) => {
                log.succeed(step);
                Ok(Empty {})
            }
            Err(e) => Err(log.fail(
                step,
                create_error(ErrorKind::ActionError, "SetText failed", &e),
            )),
        }
    }

    fn send_keys_steps(&self, log: &mut StepLog, request: Option<SendKeysRequest>) -> Result<Empty, RpcError> {
        let request = validate(log, methods::SEND_KEYS, request, |request, step| {
            step.param("sessionId", &request.session_id);
            require_session_id(&request.session_id)?;
            Ok(request)
        })?;
        let session = self.resolve_session(log, &request.session_id)?;

        let step = OpenStep::new("SendKeys", "SendKeys").with_param("keys", &request.keys);
        match session
            .main_window(SEND_KEYS_FOCUS_TIMEOUT)
            .and_then(|window| window.focus())
        {
            Ok(()) => {}
            Err(e) => debug!("could not focus main window before SendKeys: {e}"),
        }

        let parsed = match keys::parse(&request.keys) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Err(log.fail(
                    step,
                    RpcError::invalid_argument("Failed to parse keys").with_detail("error", e.to_string()),
                ))
            }
        };
        match session.engine().send_keys(&parsed) {
            Ok(()) => {
                log.succeed(step.with_param("kind", parsed.kind()));
                Ok(Empty {})
            }
            Err(e) => Err(log.fail(
                step,
                create_error(ErrorKind::ActionError, "SendKeys failed", &e),
            )),
        }
    }

    fn wait_until_steps(&self, log: &mut StepLog, request: Option<WaitUntilRequest>) -> Result<Empty, RpcError> {
        let (session_id, condition, timeout_ms) =
            validate(log, methods::WAIT_UNTIL, request, |request, step| {
                step.param("sessionId", &request.session_id)
                    .param("timeoutMs", request.timeout_ms);
                require_session_id(&request.session_id)?;
                let timeout_ms = timeout_or(request.timeout_ms, DEFAULT_FIND_TIMEOUT_MS);
                let condition = request
                    .condition
                    .ok_or_else(|| RpcError::invalid_argument("Condition must be provided"))?;
                Ok((request.session_id, condition, timeout_ms))
            })?;
        let session = self.resolve_session(log, &session_id)?;

        let step = OpenStep::new("WaitUntil", "WaitUntil")
            .with_selector(condition.selector.as_ref())
            .with_param("kind", condition.kind.as_str())
            .with_param("timeoutMs", timeout_ms);
        let main_window = match session.main_window(RESOLVE_MAIN_WINDOW_TIMEOUT) {
            Ok(window) => window,
            Err(e) => {
                return Err(log.fail(
                    step,
                    create_error(ErrorKind::ConfigError, "Failed to get main window", &e),
                ))
            }
        };

        let satisfied = waiter::poll_until(
            || evaluate_in(&[&main_window], &condition),
            Duration::from_millis(timeout_ms),
            DEFAULT_POLL_INTERVAL,
        );
        if satisfied {
            log.succeed(step);
            Ok(Empty {})
        } else {
            Err(log.fail(
                step,
                RpcError::new(ErrorKind::TimeoutError, "WaitUntil timed out"),
            ))
        }
    }

    fn run_flow_steps(
        &self,
        log: &mut StepLog,
        request: Option<RunFlowRequest>,
    ) -> Result<Value, FlowFailure> {
        let request = validate(log, methods::RUN_FLOW, request, |mut request, step| {
            step.param("sessionId", &request.session_id)
                .param("flowName", &request.flow_name)
                .param("timeoutMs", request.timeout_ms);
            require_session_id(&request.session_id)?;
            if request.flow_name.trim().is_empty() {
                return Err(RpcError::invalid_argument("FlowName must be provided"));
            }
            request.timeout_ms = timeout_or(request.timeout_ms, DEFAULT_RUN_FLOW_TIMEOUT_MS) as i64;
            Ok(request)
        })?;
        let flow_name = request.flow_name.as_str();

        let step = OpenStep::new("DispatchFlow", "Dispatch flow").with_param("flowName", flow_name);
        let flow = match self.flows.lookup(flow_name) {
            Lookup::Ready(flow) => {
                log.succeed(step);
                flow
            }
            Lookup::NotImplemented => {
                log.succeed(step);
                let step = OpenStep::new("NotImplemented", "Flow not implemented")
                    .with_param("flowName", flow_name);
                let error = RpcError::new(
                    ErrorKind::NotImplemented,
                    "Flow is registered but not implemented yet",
                )
                .with_detail("flowName", flow_name);
                return Err(log.fail(step, error).into());
            }
            Lookup::Unknown => {
                let available = self.flows.available().join(", ");
                let step = step.with_param("availableFlows", &available);
                let error = RpcError::invalid_argument("Unknown flow")
                    .with_detail("flowName", flow_name)
                    .with_detail("availableFlows", available);
                return Err(log.fail(step, error).into());
            }
        };

        let args = match (request.args, request.args_json.as_deref()) {
            (Some(args), _) => Some(args),
            (None, Some(json)) => {
                let step = OpenStep::new("ParseArgsJson", "Parse args json")
                    .with_param("length", json.chars().count());
                match serde_json::from_str::<Value>(json) {
                    Ok(parsed) => {
                        log.succeed(step);
                        Some(parsed)
                    }
                    Err(e) => {
                        let error = RpcError::invalid_argument("Failed to parse ArgsJson")
                            .with_detail("exceptionType", "serde_json::Error")
                            .with_detail("exceptionMessage", e.to_string());
                        return Err(log.fail(step, error).into());
                    }
                }
            }
            (None, None) => None,
        };

        let session = self.resolve_session(log, &request.session_id)?;
        let timeout = Duration::from_millis(request.timeout_ms as u64);
        let mut ctx = FlowContext::new(session, timeout, std::mem::take(log));

        info!("running flow {flow_name}");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| flow.run(&mut ctx, args.as_ref())));
        *log = ctx.into_log();

        match outcome {
            Ok(result) => {
                if let Err(failure) = &result {
                    warn!("flow {flow_name} failed: {}", failure.error);
                }
                result
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!("flow {flow_name} panicked: {message}");
                let error = RpcError::new(ErrorKind::ActionError, "Flow execution failed")
                    .with_detail("exceptionType", "panic")
                    .with_detail("exceptionMessage", message);
                let step = OpenStep::new("FlowException", "FlowException");
                Err(log.fail(step, error).into())
            }
        }
    }

    /// `ResolveSession`: looks the id up in the registry.
    fn resolve_session(&self, log: &mut StepLog, session_id: &str) -> Result<Arc<Session>, RpcError> {
        let step = OpenStep::new("ResolveSession", "ResolveSession").with_param("sessionId", session_id);
        match self.sessions.get(session_id) {
            Some(session) => {
                log.succeed(step);
                Ok(session)
            }
            None => Err(log.fail(step, session_not_found(session_id))),
        }
    }

    /// `ResolveElement`: re-runs the reference's selector once under the main
    /// window. An element that no longer resolves is `StaleElement`.
    fn resolve_element(&self, log: &mut StepLog, element_ref: &ElementRef) -> Result<UIElement, RpcError> {
        let step = OpenStep::new("ResolveElement", "ResolveElement")
            .with_selector(Some(&element_ref.selector))
            .with_param("sessionId", &element_ref.session_id);

        let session = match self.resolve_session(log, &element_ref.session_id) {
            Ok(session) => session,
            Err(e) => return Err(log.fail(step, e)),
        };
        let main_window = match session.main_window(RESOLVE_MAIN_WINDOW_TIMEOUT) {
            Ok(window) => window,
            Err(e) => {
                return Err(log.fail(
                    step,
                    create_error(ErrorKind::ConfigError, "Failed to get main window", &e),
                ))
            }
        };

        match finder::resolve(&main_window, &element_ref.selector) {
            Ok(found) => {
                log.succeed(step);
                Ok(found.element)
            }
            Err(failure) => {
                let mut error = map_find_failure(&failure);
                if error.kind == ErrorKind::FindError {
                    error.kind = ErrorKind::StaleElement;
                }
                Err(log.fail(step, error))
            }
        }
    }

    fn session_engine(&self, session_id: &str) -> Arc<dyn AccessibilityEngine> {
        self.sessions
            .get(session_id)
            .map(|s| Arc::clone(s.engine()))
            .unwrap_or_else(|| Arc::clone(&self.engine))
    }
}

/// JSON-RPC level failure: transport, routing or params, never a flow error
struct WireError {
    code: i64,
    message: String,
}

fn argument<T: DeserializeOwned>(request: &JsonRpcRequest) -> Result<Option<T>, WireError> {
    request.parse_argument().map_err(|e| WireError {
        code: INVALID_PARAMS,
        message: format!("Invalid params: {e}"),
    })
}

fn reply<T: Serialize>(result: RpcResult<T>) -> Result<Value, WireError> {
    serde_json::to_value(result).map_err(|e| WireError {
        code: INTERNAL_ERROR,
        message: format!("Failed to serialize result: {e}"),
    })
}

fn finish<T>(outcome: Result<T, RpcError>, log: StepLog) -> RpcResult<T> {
    match outcome {
        Ok(value) => RpcResult::success(value, log),
        Err(error) => RpcResult::failure(error, log),
    }
}

/// `ValidateRequest`: rejects a null request, then lets `check` record
/// parameters and normalise the request.
fn validate<T, U, F>(log: &mut StepLog, method: &str, request: Option<T>, check: F) -> Result<U, RpcError>
where
    F: FnOnce(T, &mut OpenStep) -> Result<U, RpcError>,
{
    let mut step = OpenStep::new("ValidateRequest", format!("Validate {method} request"));
    let Some(request) = request else {
        return Err(log.fail(step, RpcError::invalid_argument("request must not be null")));
    };
    match check(request, &mut step) {
        Ok(validated) => {
            log.succeed(step);
            Ok(validated)
        }
        Err(e) => Err(log.fail(step, e)),
    }
}

fn get_main_window(log: &mut StepLog, session: &Session, timeout: Duration) -> Result<UIElement, RpcError> {
    let step = OpenStep::new("GetMainWindow", "Get main window");
    match session.main_window(timeout) {
        Ok(window) => {
            log.succeed(step);
            Ok(window)
        }
        Err(e) => Err(log.fail(
            step,
            create_error(ErrorKind::ConfigError, "Failed to get main window", &e),
        )),
    }
}

/// Replace goes through the value pattern when present; otherwise the
/// element is focused, everything selected unless appending, and typed into.
fn require_session_id(session_id: &str) -> Result<(), RpcError> {
    if session_id.trim().is_empty() {
        return Err(RpcError::invalid_argument("SessionId must be provided"));
    }
    Ok(())
}

fn element_missing() -> RpcError {
    RpcError::invalid_argument("Element must be provided")
}

fn session_not_found(session_id: &str) -> RpcError {
    RpcError::new(ErrorKind::ConfigError, "Session not found").with_detail("sessionId", session_id)
}

fn timeout_or(value: i64, default: i64) -> u64 {
    if value > 0 {
        value as u64
    } else {
        default as u64
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "flow panicked".to_string()
    }
}

