use anyhow::{Context, Result};
use clap::ValueEnum;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use uiaflow::platforms::memory::MemoryEngine;
use uiaflow::AccessibilityEngine;

/// Which accessibility backend the agent drives
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum EngineKind {
    /// Live UI Automation tree (Windows only)
    Windows,
    /// Scripted in-memory tree, the built-in demo target unless `--tree` is given
    Memory,
}

/// Logs go to stderr; stdout carries the READY token and RPC frames.
pub fn init_logging() -> Result<()> {
    let log_level = env::var("LOG_LEVEL")
        .map(|level| match level.to_lowercase().as_str() {
            "error" => Level::ERROR,
            "warn" => Level::WARN,
            "info" => Level::INFO,
            "debug" => Level::DEBUG,
            _ => Level::INFO,
        })
        .unwrap_or(Level::INFO);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    Ok(())
}

pub fn create_engine(kind: EngineKind, tree: Option<&Path>) -> Result<Arc<dyn AccessibilityEngine>> {
    match kind {
        EngineKind::Windows => {
            let engine = uiaflow::create_engine().context("failed to start UI Automation")?;
            info!("using the UI Automation engine");
            Ok(engine)
        }
        EngineKind::Memory => {
            let engine = match tree {
                Some(path) => {
                    let json = std::fs::read_to_string(path)
                        .with_context(|| format!("failed to read tree file {}", path.display()))?;
                    MemoryEngine::from_json(&json)
                        .with_context(|| format!("invalid tree file {}", path.display()))?
                }
                None => MemoryEngine::demo().context("built-in demo tree is invalid")?,
            };
            info!("using the in-memory engine: {:?}", engine);
            Ok(Arc::new(engine))
        }
    }
}
