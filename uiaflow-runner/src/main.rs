use anyhow::Result;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use uiaflow::platforms::memory::MemoryEngine;
use uiaflow_runner::config::RunnerConfig;
use uiaflow_runner::probe::{run_probe, ProbeOptions};
use uiaflow_runner::reports::{create_run_dir, write_json};
use uiaflow_runner::utils::{init_logging, local_engine, resolve_agent_path};
use uiaflow_runner::{connectivity, demo, evidence, exit_code};
use uiaflow_runner::{run_sequence, AgentProcess, AgentRpc, SequenceOptions};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "uiaflow runner - runs configured flows against a uiaflow agent and packages the evidence"
)]
struct Args {
    /// Runner config (JSON); without it the demo scenario runs
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the selector profiles
    #[arg(long)]
    selectors_root: Option<PathBuf>,

    /// Selector profile name (default: autothink)
    #[arg(long)]
    profile: Option<String>,

    /// Agent executable (default: uiaflow-agent next to this binary)
    #[arg(long)]
    agent_path: Option<String>,

    /// Verify an evidence pack instead of running
    #[arg(long)]
    verify: bool,

    /// Evidence pack directory for --verify
    #[arg(long)]
    evidence: Option<PathBuf>,

    /// Probe the selectors of one flow
    #[arg(long)]
    probe: bool,

    #[arg(long)]
    probe_flow: Option<String>,

    /// Comma separated selector keys (default: every key of the profile)
    #[arg(long)]
    probe_keys: Option<String>,

    /// mainWindow (default) or desktop
    #[arg(long)]
    probe_search_root: Option<String>,

    #[arg(long)]
    probe_timeout_ms: Option<u64>,

    /// Only run the connectivity check
    #[arg(long)]
    check: bool,

    /// Continue even when the connectivity check fails
    #[arg(long)]
    skip_check: bool,

    /// Connectivity check timeout
    #[arg(long, default_value_t = connectivity::DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Run the demo scenario against the agent's built-in demo target
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    init_logging()?;

    let code = run(args).await;
    info!("Exit code: {code}");
    Ok(ExitCode::from(code as u8))
}

fn verify(args: &Args) -> i32 {
    let Some(pack_dir) = args.evidence.as_deref() else {
        error!("Verify requires --evidence <dir>.");
        return exit_code::USAGE;
    };
    match evidence::verify(pack_dir) {
        Err(e) => {
            error!("{e}");
            exit_code::USAGE
        }
        Ok(errors) if errors.is_empty() => {
            info!("Evidence pack OK: {}", pack_dir.display());
            exit_code::OK
        }
        Ok(errors) => {
            for message in &errors {
                error!("{message}");
            }
            exit_code::CHECK_FAILED
        }
    }
}

async fn run(args: Args) -> i32 {
    if args.verify {
        return verify(&args);
    }

    let loaded = match args.config.as_deref().map(RunnerConfig::load).transpose() {
        Ok(loaded) => loaded,
        Err(e) => {
            error!("{e}");
            return exit_code::CONFIG_ERROR;
        }
    };
    let config_dir = loaded
        .as_ref()
        .map(|(_, dir)| dir.clone())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let config = loaded.map(|(config, _)| config);

    let agent_path = resolve_agent_path(
        args.agent_path.as_deref(),
        config.as_ref().and_then(|c| c.agent_path.as_deref()),
        &config_dir,
    );
    info!("AgentExe: {}", agent_path.display());
    if !agent_path.is_file() {
        error!("Agent not found: {}", agent_path.display());
        return exit_code::USAGE;
    }

    let logs_root = match &config {
        Some(config) => config.logs_root(&config_dir),
        None => config_dir.join("logs"),
    };

    if args.check {
        return check_only(&agent_path, &logs_root, &args).await;
    }

    if args.probe {
        if args.demo {
            error!("Probe mode cannot be combined with --demo.");
            return exit_code::USAGE;
        }
        let Some(config) = &config else {
            error!("Probe mode requires --config <path>.");
            return exit_code::USAGE;
        };
        return probe(config, &config_dir, &agent_path, &logs_root, &args).await;
    }

    match config {
        Some(config) if !args.demo => run_config(config, config_dir, &agent_path, &logs_root, &args).await,
        _ => run_demo(&agent_path, &logs_root, &args).await,
    }
}

fn start_agent(agent_path: &Path, agent_args: &[&str]) -> Option<AgentRpc<AgentProcess>> {
    match AgentProcess::spawn(agent_path, agent_args) {
        Ok(process) => Some(AgentRpc::new(process)),
        Err(e) => {
            error!("Failed to start agent: {e}");
            None
        }
    }
}

async fn check_only(agent_path: &Path, logs_root: &Path, args: &Args) -> i32 {
    let Some(mut rpc) = start_agent(agent_path, &[]) else {
        return exit_code::AGENT_START_FAILED;
    };
    let run_dir = match create_run_dir(logs_root) {
        Ok(dir) => dir,
        Err(e) => {
            error!("failed to create run directory: {e}");
            rpc.shutdown().await;
            return exit_code::CONFIG_ERROR;
        }
    };
    info!("RunDir: {}", run_dir.display());

    let cwd = std::env::current_dir().map(|d| d.display().to_string()).unwrap_or_default();
    let report = connectivity::check(&mut rpc, &agent_path.display().to_string(), &cwd, args.timeout_ms).await;
    let path = run_dir.join(connectivity::REPORT_FILE);
    if let Err(e) = write_json(&path, &report) {
        warn!("failed to write {}: {e}", path.display());
    }
    info!("Connectivity: {}", path.display());
    rpc.shutdown().await;

    if report.ok {
        info!("Connectivity check: OK");
        exit_code::OK
    } else {
        error!(
            "Connectivity check: FAIL - {}",
            report.failure_message().unwrap_or_default()
        );
        if let Some(hint) = report.hint() {
            error!("Hint: {hint}");
        }
        exit_code::CHECK_FAILED
    }
}

async fn probe(config: &RunnerConfig, config_dir: &Path, agent_path: &Path, logs_root: &Path, args: &Args) -> i32 {
    let selectors_root = config.selectors_root(args.selectors_root.as_deref(), config_dir);
    let profile = config.profile_name(args.profile.as_deref());
    info!("SelectorsRoot: {}", selectors_root.display());
    info!("Profile: {profile}");

    let Some(mut rpc) = start_agent(agent_path, &[]) else {
        return exit_code::AGENT_START_FAILED;
    };
    let options = ProbeOptions {
        flow_name: args.probe_flow.clone(),
        keys: args.probe_keys.clone(),
        search_root: args.probe_search_root.clone(),
        timeout_ms: args.probe_timeout_ms,
        agent_path: agent_path.display().to_string(),
        check_timeout_ms: args.timeout_ms,
        skip_check: args.skip_check,
    };
    let outcome = run_probe(
        &mut rpc,
        config,
        &selectors_root,
        &profile,
        logs_root,
        &options,
        local_engine(),
    )
    .await;
    rpc.shutdown().await;
    outcome.exit_code
}

async fn run_config(
    config: RunnerConfig,
    config_dir: PathBuf,
    agent_path: &Path,
    logs_root: &Path,
    args: &Args,
) -> i32 {
    let selectors_root = config.selectors_root(args.selectors_root.as_deref(), &config_dir);
    let profile = config.profile_name(args.profile.as_deref());
    info!("SelectorsRoot: {}", selectors_root.display());
    info!("Profile: {profile}");
    info!("LogsRoot: {}", logs_root.display());

    let run_dir = match create_run_dir(logs_root) {
        Ok(dir) => dir,
        Err(e) => {
            error!("failed to create run directory under {}: {e}", logs_root.display());
            return exit_code::CONFIG_ERROR;
        }
    };
    info!("RunDir: {}", run_dir.display());

    let Some(mut rpc) = start_agent(agent_path, &[]) else {
        return exit_code::AGENT_START_FAILED;
    };
    let recovery_engine = if config.ui_state_recovery.enable {
        local_engine()
    } else {
        None
    };
    let options = SequenceOptions {
        config,
        config_dir,
        selectors_root,
        profile,
        run_dir,
        agent_path: agent_path.display().to_string(),
        check_timeout_ms: args.timeout_ms,
        skip_check: args.skip_check,
    };
    let outcome = run_sequence(&mut rpc, &options, recovery_engine).await;
    rpc.shutdown().await;
    outcome.exit_code
}

async fn run_demo(agent_path: &Path, logs_root: &Path, args: &Args) -> i32 {
    if let Err(e) = MemoryEngine::demo() {
        error!("Demo target unavailable: {e}");
        return exit_code::DEMO_UNAVAILABLE;
    }
    let Some(mut rpc) = start_agent(agent_path, &["--engine", "memory"]) else {
        return exit_code::AGENT_START_FAILED;
    };
    let outcome = demo::run_demo(
        &mut rpc,
        logs_root,
        &agent_path.display().to_string(),
        args.timeout_ms,
        args.skip_check,
    )
    .await;
    rpc.shutdown().await;
    outcome.exit_code
}
