//! Request and response payloads for each RPC method.

use crate::rpc::error::{ErrorKind, RpcError};
use crate::selector::{ElementSelector, WaitCondition};
use crate::step_log::StepLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_OPEN_SESSION_TIMEOUT_MS: i64 = 10_000;
pub const DEFAULT_FIND_TIMEOUT_MS: i64 = 5_000;
pub const DEFAULT_RUN_FLOW_TIMEOUT_MS: i64 = 30_000;

/// Result envelope of every RPC method except `Ping`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcResult<T> {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(default)]
    pub step_log: StepLog,
}

impl<T> RpcResult<T> {
    pub fn success(value: T, step_log: StepLog) -> Self {
        Self {
            ok: true,
            value: Some(value),
            error: None,
            step_log,
        }
    }

    pub fn failure(error: RpcError, step_log: StepLog) -> Self {
        Self {
            ok: false,
            value: None,
            error: Some(error),
            step_log,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Value of methods that return nothing but a step log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenSessionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_window_title_contains: Option<String>,
    pub timeout_ms: i64,
    pub bring_to_foreground: bool,
}

impl Default for OpenSessionRequest {
    fn default() -> Self {
        Self {
            process_id: None,
            process_name: None,
            main_window_title_contains: None,
            timeout_ms: DEFAULT_OPEN_SESSION_TIMEOUT_MS,
            bring_to_foreground: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenSessionResponse {
    pub session_id: String,
    pub process_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_window_title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloseSessionRequest {
    pub session_id: String,
}

/// A re-resolvable handle to an element found earlier in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementRef {
    pub session_id: String,
    pub selector: ElementSelector,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_id: Option<String>,
    pub captured_at_utc: DateTime<Utc>,
}

impl Default for ElementRef {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            selector: ElementSelector::default(),
            runtime_id: None,
            captured_at_utc: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindElementRequest {
    pub session_id: String,
    pub selector: ElementSelector,
    pub timeout_ms: i64,
}

impl Default for FindElementRequest {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            selector: ElementSelector::default(),
            timeout_ms: DEFAULT_FIND_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FindElementResponse {
    pub element: ElementRef,
}

/// Shared body of `Click`, `DoubleClick` and `RightClick`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementRefRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementRef>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SetTextMode {
    #[default]
    Replace,
    Append,
    CtrlAReplace,
}

impl SetTextMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SetTextMode::Replace => "Replace",
            SetTextMode::Append => "Append",
            SetTextMode::CtrlAReplace => "CtrlAReplace",
        }
    }

    /// Case-insensitive; blank means `Replace`.
    pub fn parse(value: Option<&str>) -> Option<Self> {
        let value = match value.map(str::trim) {
            None | Some("") => return Some(SetTextMode::Replace),
            Some(v) => v,
        };
        [SetTextMode::Replace, SetTextMode::Append, SetTextMode::CtrlAReplace]
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SetTextRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementRef>,
    pub text: String,
    pub mode: String,
}

impl Default for SetTextRequest {
    fn default() -> Self {
        Self {
            element: None,
            text: String::new(),
            mode: SetTextMode::Replace.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendKeysRequest {
    pub session_id: String,
    pub keys: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WaitUntilRequest {
    pub session_id: String,
    pub timeout_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<WaitCondition>,
}

impl Default for WaitUntilRequest {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            timeout_ms: DEFAULT_FIND_TIMEOUT_MS,
            condition: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunFlowRequest {
    pub session_id: String,
    pub flow_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args_json: Option<String>,
    pub timeout_ms: i64,
}

impl Default for RunFlowRequest {
    fn default() -> Self {
        Self {
            session_id: String::new(),
            flow_name: String::new(),
            args: None,
            args_json: None,
            timeout_ms: DEFAULT_RUN_FLOW_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunFlowResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
