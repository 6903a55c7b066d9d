//! Deterministic flow automation over a desktop accessibility tree
//!
//! Selectors are resolved step by step against a UI Automation tree, every
//! action is recorded in a structured step log, and named flows (attach,
//! variable import, program paste, build) are served over a header-framed
//! JSON-RPC boundary.

pub mod clipboard;
pub mod control_types;
pub mod element;
pub mod errors;
pub mod finder;
pub mod flows;
pub mod keys;
pub mod platforms;
pub mod rpc;
pub mod selector;
pub mod service;
pub mod session;
pub mod step_log;
#[cfg(test)]
mod tests;
pub mod waiter;

pub use element::{TextSource, UIElement, UIElementAttributes, UIElementImpl};
pub use errors::AutomationError;
pub use flows::{Flow, FlowContext, FlowFailure, FlowOutcome, FlowRegistry};
pub use platforms::{create_engine, AccessibilityEngine};
pub use selector::{ElementSelector, SearchKind, SelectorStep, WaitCondition, WaitConditionKind};
pub use service::UiaRpcService;
pub use session::{Session, SessionRegistry};
pub use step_log::{OpenStep, StepLog, StepLogEntry, StepOutcome};
