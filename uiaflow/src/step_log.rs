//! Append-only audit trail of one RPC call.
//!
//! A step starts as an [`OpenStep`] builder owned by the code performing the
//! action. Closing it with `success`/`warning`/`fail` yields an immutable
//! [`StepLogEntry`] which is then pushed onto the [`StepLog`].

use crate::rpc::error::RpcError;
use crate::selector::{describe_match_rules, ElementSelector};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Success,
    Warning,
    #[default]
    Fail,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Success => "Success",
            StepOutcome::Warning => "Warning",
            StepOutcome::Fail => "Fail",
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepLogEntry {
    pub step_id: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<ElementSelector>,
    pub started_at_utc: DateTime<Utc>,
    pub finished_at_utc: DateTime<Utc>,
    pub duration_ms: i64,
    #[serde(default)]
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl StepLogEntry {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepLog {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    pub steps: Vec<StepLogEntry>,
}

impl StepLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: StepLogEntry) {
        self.steps.push(entry);
    }

    pub fn succeed(&mut self, step: OpenStep) {
        self.push(step.success());
    }

    pub fn warn(&mut self, step: OpenStep, error: RpcError) {
        self.push(step.warning(error));
    }

    /// Closes `step` as failed and hands the error back.
    pub fn fail(&mut self, step: OpenStep, error: RpcError) -> RpcError {
        self.push(step.fail(error.clone()));
        error
    }

    pub fn extend(&mut self, other: StepLog) {
        self.steps.extend(other.steps);
    }

    pub fn last(&self) -> Option<&StepLogEntry> {
        self.steps.last()
    }

    pub fn find(&self, step_id: &str) -> Option<&StepLogEntry> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    /// First entry that stopped the call, if any
    pub fn first_failure(&self) -> Option<&StepLogEntry> {
        self.steps.iter().find(|s| s.outcome == StepOutcome::Fail)
    }

    /// `(stepId, outcome)` pairs, handy for asserting on sequences
    pub fn outline(&self) -> Vec<(String, StepOutcome)> {
        self.steps
            .iter()
            .map(|s| (s.step_id.clone(), s.outcome))
            .collect()
    }
}

/// A step that has started but not yet reached a terminal outcome
#[derive(Debug)]
pub struct OpenStep {
    step_id: String,
    action: String,
    parameters: BTreeMap<String, String>,
    selector: Option<ElementSelector>,
    started_at_utc: DateTime<Utc>,
    started: Instant,
}

impl OpenStep {
    pub fn new(step_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            action: action.into(),
            parameters: BTreeMap::new(),
            selector: None,
            started_at_utc: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn param(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_param(mut self, key: &str, value: impl ToString) -> Self {
        self.param(key, value);
        self
    }

    pub fn params<I, K, V>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (k, v) in values {
            self.parameters.insert(k.into(), v.into());
        }
        self
    }

    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Attaches a selector snapshot; records `matchRule` when exact and
    /// contains filters overlap on a step.
    pub fn with_selector(mut self, selector: Option<&ElementSelector>) -> Self {
        if let Some(selector) = selector {
            if let Some(rules) = describe_match_rules(selector) {
                self.parameters.insert("matchRule".to_string(), rules);
            }
            self.selector = Some(selector.clone());
        }
        self
    }

    pub fn success(self) -> StepLogEntry {
        self.close(StepOutcome::Success, None)
    }

    pub fn warning(self, error: RpcError) -> StepLogEntry {
        self.close(StepOutcome::Warning, Some(error))
    }

    pub fn fail(self, error: RpcError) -> StepLogEntry {
        self.close(StepOutcome::Fail, Some(error))
    }

    /// `warning` when `warn` is set, `fail` otherwise
    pub fn fail_or_warn(self, error: RpcError, warn: bool) -> StepLogEntry {
        if warn {
            self.warning(error)
        } else {
            self.fail(error)
        }
    }

    fn close(self, outcome: StepOutcome, error: Option<RpcError>) -> StepLogEntry {
        let finished_at_utc = Utc::now();
        StepLogEntry {
            step_id: self.step_id,
            action: self.action,
            parameters: self.parameters,
            selector: self.selector,
            started_at_utc: self.started_at_utc,
            finished_at_utc,
            duration_ms: self.started.elapsed().as_millis() as i64,
            outcome,
            error,
        }
    }
}
