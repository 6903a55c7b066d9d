//! Header-framed JSON-RPC 2.0 over a byte stream.
//!
//! Frames are read asynchronously, but every request is executed on a single
//! dedicated worker thread, one at a time and in arrival order. UI Automation
//! calls therefore never hop between threads.

use anyhow::{anyhow, Context, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};
use uiaflow::rpc::envelope::{INTERNAL_ERROR, INVALID_REQUEST, PARSE_ERROR};
use uiaflow::rpc::{FramingError, HeaderCodec, JsonRpcRequest, JsonRpcResponse};
use uiaflow::UiaRpcService;

/// First line written to stdout once the agent accepts requests
pub const READY_TOKEN: &str = "READY";

type Job = (JsonRpcRequest, oneshot::Sender<Option<JsonRpcResponse>>);

/// Owns the thread that executes requests against the service.
pub struct RequestWorker {
    jobs: mpsc::Sender<Job>,
}

impl RequestWorker {
    pub fn spawn(service: Arc<UiaRpcService>) -> Result<Self> {
        let (jobs, queue) = mpsc::channel::<Job>();
        thread::Builder::new()
            .name("uiaflow-rpc".to_string())
            .spawn(move || {
                for (request, reply) in queue {
                    let response = handle_guarded(&service, &request);
                    if reply.send(response).is_err() {
                        debug!("caller went away before {} completed", request.method);
                    }
                }
                debug!("rpc worker stopped");
            })
            .context("failed to spawn rpc worker thread")?;
        Ok(Self { jobs })
    }

    /// Queues `request` and waits for its response. Notifications yield `None`.
    pub async fn call(&self, request: JsonRpcRequest) -> Result<Option<JsonRpcResponse>> {
        let (reply, response) = oneshot::channel();
        self.jobs
            .send((request, reply))
            .map_err(|_| anyhow!("rpc worker has stopped"))?;
        response.await.context("rpc worker dropped the request")
    }
}

fn handle_guarded(service: &UiaRpcService, request: &JsonRpcRequest) -> Option<JsonRpcResponse> {
    match panic::catch_unwind(AssertUnwindSafe(|| service.handle(request))) {
        Ok(response) => response,
        Err(_) => {
            error!("request {} panicked", request.method);
            (!request.is_notification()).then(|| {
                JsonRpcResponse::error(
                    request.id.clone(),
                    INTERNAL_ERROR,
                    format!("Internal error while handling {}", request.method),
                )
            })
        }
    }
}

/// Serves requests from `reader` until it reaches EOF.
pub async fn serve<R, W>(service: Arc<UiaRpcService>, reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let worker = RequestWorker::spawn(service)?;
    let mut requests = FramedRead::new(reader, HeaderCodec::new());
    let mut responses = FramedWrite::new(writer, HeaderCodec::new());

    while let Some(frame) = requests.next().await {
        let body = match frame {
            Ok(body) => body,
            Err(FramingError::Io(e)) => return Err(e).context("failed to read request stream"),
            Err(e) => {
                warn!("closing connection after framing error: {e}");
                return Err(e.into());
            }
        };

        let Some(response) = respond(&worker, &body).await? else {
            continue;
        };
        let text = serde_json::to_string(&response).context("failed to encode response")?;
        responses
            .send(text)
            .await
            .context("failed to write response")?;
    }

    info!("request stream closed");
    Ok(())
}

async fn respond(worker: &RequestWorker, body: &str) -> Result<Option<JsonRpcResponse>> {
    let value: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(e) => {
            warn!("unparseable request: {e}");
            return Ok(Some(JsonRpcResponse::error(
                None,
                PARSE_ERROR,
                format!("Parse error: {e}"),
            )));
        }
    };
    let id = value.get("id").cloned();
    let request: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return Ok(Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                format!("Invalid request: {e}"),
            )))
        }
    };
    worker.call(request).await
}

/// Announces readiness on stdout, then serves stdin/stdout.
pub async fn serve_stdio(service: Arc<UiaRpcService>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout
        .write_all(format!("{READY_TOKEN}\n").as_bytes())
        .await
        .context("failed to announce readiness")?;
    stdout.flush().await?;
    info!("agent ready, serving stdin/stdout");

    serve(service, tokio::io::stdin(), stdout).await
}
