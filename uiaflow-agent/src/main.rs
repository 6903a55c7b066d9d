use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use uiaflow::UiaRpcService;
use uiaflow_agent::{create_engine, init_logging, serve_stdio, EngineKind};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "uiaflow agent - drives a desktop application's accessibility tree over JSON-RPC"
)]
struct Args {
    /// Accessibility backend
    #[arg(long, value_enum, default_value = "windows")]
    engine: EngineKind,

    /// JSON tree for the memory engine (defaults to the built-in demo target)
    #[arg(long)]
    tree: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging()?;

    tracing::info!("Initializing uiaflow agent...");
    tracing::info!("Engine: {:?}", args.engine);

    let engine = create_engine(args.engine, args.tree.as_deref())?;
    let service = Arc::new(UiaRpcService::new(engine));
    tracing::info!("Flows: {}", service.flows().available().join(", "));

    serve_stdio(service).await.inspect_err(|e| {
        tracing::error!("Serving error: {:?}", e);
    })
}
