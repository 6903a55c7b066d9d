//! Agent handshake: READY line, Ping, then a presence probe of every method
//! the runner relies on.

use crate::client::{AgentRpc, ClientError, RpcChannel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};
use uiaflow::rpc::methods;
use uiaflow::rpc::ErrorKind;
use uiaflow_agent::READY_TOKEN;

pub const REPORT_FILE: &str = "connectivity.json";
pub const DEFAULT_TIMEOUT_MS: u64 = 2_000;

/// Methods that must be served besides `Ping`
pub const REQUIRED_METHODS: [&str; 7] = [
    methods::OPEN_SESSION,
    methods::CLOSE_SESSION,
    methods::FIND_ELEMENT,
    methods::CLICK,
    methods::SET_TEXT,
    methods::SEND_KEYS,
    methods::WAIT_UNTIL,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectivityError {
    pub kind: ErrorKind,
    pub message: String,
    pub hint: String,
}

impl ConnectivityError {
    fn new(message: impl Into<String>, hint: &str) -> Self {
        Self {
            kind: ErrorKind::ConfigError,
            message: message.into(),
            hint: hint.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectivityReport {
    pub ok: bool,
    pub agent_path: String,
    pub working_dir: String,
    pub handshake_ready: bool,
    pub ping_ok: bool,
    pub methods: BTreeMap<String, bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_head: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ConnectivityError>,
    pub duration_ms: i64,
}

impl ConnectivityReport {
    pub fn failure_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }

    pub fn hint(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.hint.as_str())
    }
}

/// Runs the handshake on a freshly started channel.
pub async fn check<C: RpcChannel>(
    rpc: &mut AgentRpc<C>,
    agent_path: &str,
    working_dir: &str,
    timeout_ms: u64,
) -> ConnectivityReport {
    let started = Instant::now();
    let mut report = ConnectivityReport {
        agent_path: agent_path.to_string(),
        working_dir: working_dir.to_string(),
        ..ConnectivityReport::default()
    };

    let error = run_checks(rpc, &mut report, timeout_ms).await.err();
    report.ok = error.is_none();
    report.error = error;
    report.duration_ms = started.elapsed().as_millis() as i64;

    match &report.error {
        None => info!("connectivity ok in {} ms", report.duration_ms),
        Some(e) => warn!("connectivity failed: {} ({})", e.message, e.hint),
    }
    report
}

async fn run_checks<C: RpcChannel>(
    rpc: &mut AgentRpc<C>,
    report: &mut ConnectivityReport,
    timeout_ms: u64,
) -> Result<(), ConnectivityError> {
    let line = match rpc.read_ready_line(timeout_ms).await {
        Ok(line) => line,
        Err(ClientError::Timeout { .. }) => {
            return Err(ConnectivityError::new(
                "Handshake timeout (READY not received).",
                "Ensure the agent is the correct executable and can start normally.",
            ))
        }
        Err(e) => {
            return Err(ConnectivityError::new(
                format!("Handshake read failed: {e}"),
                "Check agent stdout and startup errors.",
            ))
        }
    };
    report.stdout_head = Some(line.clone());
    if line != READY_TOKEN {
        return Err(ConnectivityError::new(
            "Handshake mismatch (expected READY).",
            "Agent may not be the intended uiaflow-agent host.",
        ));
    }
    report.handshake_ready = true;

    match rpc.ping(timeout_ms).await {
        Ok(pong) if pong.eq_ignore_ascii_case("pong") => report.ping_ok = true,
        Ok(_) => {
            return Err(ConnectivityError::new(
                "Ping returned unexpected response.",
                "Agent RPC target may be incorrect.",
            ))
        }
        Err(ClientError::Timeout { .. }) => {
            return Err(ConnectivityError::new(
                "Ping timed out.",
                "Increase --timeout-ms or check agent responsiveness.",
            ))
        }
        Err(ClientError::MethodNotFound(_)) => {
            return Err(ConnectivityError::new(
                "Ping method not found.",
                "Agent RPC target is not uiaflow-agent (wrong executable or host).",
            ))
        }
        Err(e) => {
            return Err(ConnectivityError::new(
                format!("Ping failed: {e}"),
                "Agent RPC channel is unstable or not compatible.",
            ))
        }
    }

    let mut missing = Vec::new();
    for method in REQUIRED_METHODS {
        let present = match rpc.probe_method(method, timeout_ms).await {
            Ok(present) => present,
            Err(e) => {
                warn!("probing {method} failed: {e}");
                false
            }
        };
        report.methods.insert(method.to_string(), present);
        if !present {
            missing.push(method);
        }
    }
    if !missing.is_empty() {
        return Err(ConnectivityError::new(
            format!("Missing RPC methods: {}", missing.join(", ")),
            "You may be running a minimal agent (Ping only). Use the full uiaflow-agent host.",
        ));
    }
    Ok(())
}
