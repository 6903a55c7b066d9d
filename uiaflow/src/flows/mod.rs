//! Named, scripted operations against the driven application.
//!
//! A [`FlowRegistry`] is built once at startup and handed to the RPC service
//! by reference. Each flow appends its own steps to the [`FlowContext`] log
//! and either returns response data or a [`FlowFailure`].

pub mod attach;
pub mod build;
pub mod common;
pub mod context;
pub mod import_program;
pub mod import_variables;
pub mod popup;

pub use context::FlowContext;

use crate::rpc::RpcError;
use serde_json::Value;
use std::fmt;

/// Flow names understood by the agent, in registration order
pub mod names {
    pub const ATTACH: &str = "autothink.attach";
    pub const IMPORT_VARIABLES: &str = "autothink.importVariables";
    pub const IMPORT_PROGRAM_TEXT_PASTE: &str = "autothink.importProgram.textPaste";
    pub const BUILD: &str = "autothink.build";

    pub const ALL: [&str; 4] = [ATTACH, IMPORT_VARIABLES, IMPORT_PROGRAM_TEXT_PASTE, BUILD];

    /// Exact, case-sensitive match
    pub fn is_known(name: &str) -> bool {
        ALL.contains(&name)
    }
}

/// Why a flow stopped, plus any data it had gathered by then
#[derive(Debug, Clone, PartialEq)]
pub struct FlowFailure {
    pub error: RpcError,
    pub data: Option<Value>,
}

impl FlowFailure {
    pub fn with_data(error: RpcError, data: Value) -> Self {
        Self {
            error,
            data: Some(data),
        }
    }
}

impl From<RpcError> for FlowFailure {
    fn from(error: RpcError) -> Self {
        Self { error, data: None }
    }
}

pub type FlowOutcome = Result<Value, FlowFailure>;

pub trait Flow: Send + Sync {
    /// Case-sensitive flow name
    fn name(&self) -> &str;

    /// `false` for placeholders that are registered but not built yet
    fn is_implemented(&self) -> bool {
        true
    }

    fn run(&self, ctx: &mut FlowContext, args: Option<&Value>) -> FlowOutcome;
}

/// What the registry knows about a flow name
pub enum Lookup<'a> {
    Ready(&'a dyn Flow),
    /// Known or registered, but nothing runnable behind it
    NotImplemented,
    Unknown,
}

/// Immutable name → flow table
pub struct FlowRegistry {
    flows: Vec<Box<dyn Flow>>,
}

impl fmt::Debug for FlowRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.flows.iter().map(|x| x.name())).finish()
    }
}

impl Default for FlowRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FlowRegistry {
    pub fn empty() -> Self {
        Self { flows: Vec::new() }
    }

    /// The four flows shipped with the agent
    pub fn builtin() -> Self {
        Self::empty()
            .with_flow(Box::new(attach::AttachFlow))
            .with_flow(Box::new(import_variables::ImportVariablesFlow))
            .with_flow(Box::new(import_program::ImportProgramTextPasteFlow))
            .with_flow(Box::new(build::BuildFlow))
    }

    /// Adds `flow`, replacing any flow of the same name.
    pub fn with_flow(mut self, flow: Box<dyn Flow>) -> Self {
        self.flows.retain(|f| f.name() != flow.name());
        self.flows.push(flow);
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Flow> {
        self.flows.iter().find(|f| f.name() == name).map(|f| f.as_ref())
    }

    pub fn lookup(&self, name: &str) -> Lookup<'_> {
        match self.get(name) {
            Some(flow) if flow.is_implemented() => Lookup::Ready(flow),
            Some(_) => Lookup::NotImplemented,
            None if names::is_known(name) => Lookup::NotImplemented,
            None => Lookup::Unknown,
        }
    }

    /// Names reported to callers that ask for an unknown flow: the built-in
    /// names followed by any extra registrations.
    pub fn available(&self) -> Vec<&str> {
        let mut out: Vec<&str> = names::ALL.to_vec();
        for flow in &self.flows {
            if !out.contains(&flow.name()) {
                out.push(flow.name());
            }
        }
        out
    }
}
