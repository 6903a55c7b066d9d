pub mod server;
pub mod utils;

pub use server::{serve, serve_stdio, RequestWorker, READY_TOKEN};
pub use utils::{create_engine, init_logging, EngineKind};
