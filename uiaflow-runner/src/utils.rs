use crate::config::resolve_path;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uiaflow::AccessibilityEngine;

pub use uiaflow_agent::init_logging;

pub const AGENT_EXE_NAME: &str = "uiaflow-agent";

/// CLI value (relative to the working directory), then config value
/// (relative to the config directory), then the agent next to this binary.
pub fn resolve_agent_path(cli: Option<&str>, config: Option<&str>, config_dir: &Path) -> PathBuf {
    let non_blank = |v: Option<&str>| v.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string);
    if let Some(cli) = non_blank(cli) {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        return resolve_path(&cli, &cwd);
    }
    if let Some(configured) = non_blank(config) {
        return resolve_path(&configured, config_dir);
    }
    sibling_agent_path()
}

pub fn sibling_agent_path() -> PathBuf {
    let file_name = format!("{AGENT_EXE_NAME}{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&file_name)))
        .unwrap_or_else(|| PathBuf::from(file_name))
}

/// The runner's own UI Automation handle, used by recovery and probing.
pub fn local_engine() -> Option<Arc<dyn AccessibilityEngine>> {
    match uiaflow::create_engine() {
        Ok(engine) => {
            info!("local UI Automation engine available");
            Some(engine)
        }
        Err(e) => {
            debug!("no local UI Automation engine: {e}");
            None
        }
    }
}
