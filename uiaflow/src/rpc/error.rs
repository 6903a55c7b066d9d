use crate::errors::AutomationError;
use crate::finder::{FinderFailure, FinderFailureKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Stable public error vocabulary returned across the RPC boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidArgument,
    ConfigError,
    FindError,
    TimeoutError,
    ActionError,
    UnexpectedUIState,
    StaleElement,
    NotImplemented,
    RpcError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::ConfigError => "ConfigError",
            ErrorKind::FindError => "FindError",
            ErrorKind::TimeoutError => "TimeoutError",
            ErrorKind::ActionError => "ActionError",
            ErrorKind::UnexpectedUIState => "UnexpectedUIState",
            ErrorKind::StaleElement => "StaleElement",
            ErrorKind::NotImplemented => "NotImplemented",
            ErrorKind::RpcError => "RpcError",
        }
    }

    /// Kinds for which a popup recovery pass followed by a retry can help.
    /// Configuration-shaped failures (`InvalidArgument`, `ConfigError`) are excluded.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ErrorKind::FindError
                | ErrorKind::TimeoutError
                | ErrorKind::ActionError
                | ErrorKind::UnexpectedUIState
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error carried by RPC results and step log entries
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {message}")]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<BTreeMap<String, String>>,
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.as_ref()?.get(key).map(String::as_str)
    }
}

/// Wraps an unexpected platform failure, recording its type and message.
pub fn create_error(kind: ErrorKind, message: impl Into<String>, cause: &AutomationError) -> RpcError {
    RpcError::new(kind, message)
        .with_detail("exceptionType", cause.type_name())
        .with_detail("exceptionMessage", cause.to_string())
}

/// Collapses a selector engine failure onto the public taxonomy.
pub fn map_find_failure(failure: &FinderFailure) -> RpcError {
    let (kind, message) = match failure.kind {
        FinderFailureKind::InvalidSelector => (ErrorKind::InvalidArgument, "Invalid selector"),
        FinderFailureKind::InvalidControlType => (ErrorKind::InvalidArgument, "Invalid control type"),
        FinderFailureKind::IndexOutOfRange => {
            (ErrorKind::InvalidArgument, "Selector index out of range")
        }
        FinderFailureKind::Ambiguous => (ErrorKind::FindError, "Selector matched multiple elements"),
        FinderFailureKind::NotFound => (ErrorKind::FindError, "Element not found"),
    };

    let mut details = failure.details.clone();
    details.insert("failureKind".to_string(), failure.kind.as_str().to_string());
    RpcError {
        kind,
        message: message.to_string(),
        details: Some(details),
    }
}
