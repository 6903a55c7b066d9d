use crate::platforms::AccessibilityEngine;
use crate::rpc::RpcError;
use crate::session::Session;
use crate::step_log::{OpenStep, StepLog, StepLogEntry};
use std::sync::Arc;
use std::time::Duration;

/// Scope of one `RunFlow` call: the session, its timeout and the step log
/// being built. Dropped when the call returns.
#[derive(Debug)]
pub struct FlowContext {
    session: Arc<Session>,
    timeout: Duration,
    log: StepLog,
}

impl FlowContext {
    /// Continues `log`, which already holds the dispatcher's steps.
    pub fn new(session: Arc<Session>, timeout: Duration, log: StepLog) -> Self {
        Self {
            session,
            timeout,
            log,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Owned handle, so callers can keep it while pushing steps
    pub fn engine(&self) -> Arc<dyn AccessibilityEngine> {
        Arc::clone(self.session.engine())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn log(&self) -> &StepLog {
        &self.log
    }

    pub fn push(&mut self, entry: StepLogEntry) {
        self.log.push(entry);
    }

    pub fn succeed(&mut self, step: OpenStep) {
        self.log.succeed(step);
    }

    pub fn warn(&mut self, step: OpenStep, error: RpcError) {
        self.log.warn(step, error);
    }

    /// Closes `step` as failed and hands the error back to the caller.
    pub fn fail(&mut self, step: OpenStep, error: RpcError) -> RpcError {
        self.log.fail(step, error)
    }

    pub fn into_log(self) -> StepLog {
        self.log
    }
}
