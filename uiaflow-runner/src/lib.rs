//! Orchestrator for uiaflow agents
//!
//! Loads the runner config and layered selector profiles, checks the agent
//! connection, runs the configured flows in order with UI state recovery
//! between attempts, and packages the run artifacts into a digest-verified
//! evidence pack.

pub mod args;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod demo;
pub mod evidence;
pub mod inputs;
pub mod probe;
pub mod profiles;
pub mod recovery;
pub mod reports;
pub mod selector_check;
pub mod sequence;
#[cfg(test)]
mod tests;
pub mod utils;

pub use client::{AgentProcess, AgentRpc, ClientError, RpcChannel, StreamChannel};
pub use config::RunnerConfig;
pub use sequence::{run_sequence, SequenceOptions, SequenceOutcome};

/// Process exit codes of the runner binary
pub mod exit_code {
    pub const OK: i32 = 0;
    /// Bad usage, missing agent, or unreadable evidence pack input
    pub const USAGE: i32 = 2;
    pub const DEMO_UNAVAILABLE: i32 = 3;
    pub const AGENT_START_FAILED: i32 = 4;
    /// Config or session setup error
    pub const CONFIG_ERROR: i32 = 5;
    /// Connectivity, selector check, OpenSession, or evidence verification failure
    pub const CHECK_FAILED: i32 = 6;
    pub const ATTACH_FAILED: i32 = 10;
    pub const IMPORT_VARIABLES_FAILED: i32 = 11;
    pub const IMPORT_PROGRAM_FAILED: i32 = 12;
    pub const BUILD_CONFIG_INVALID: i32 = 13;
    pub const BUILD_FAILED: i32 = 14;
}
