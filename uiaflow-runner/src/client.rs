//! Client side of the agent's header-framed JSON-RPC channel.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};
use uiaflow::rpc::methods;
use uiaflow::rpc::{
    CloseSessionRequest, Empty, FindElementRequest, FindElementResponse, FramingError, HeaderCodec,
    JsonRpcRequest, JsonRpcResponse, OpenSessionRequest, OpenSessionResponse, RpcResult,
    RunFlowRequest, RunFlowResponse,
};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("agent closed the channel")]
    Closed,
    #[error("{method} timed out after {timeout_ms} ms")]
    Timeout { method: String, timeout_ms: u64 },
    #[error("method not found: {0}")]
    MethodNotFound(String),
    #[error("remote error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("invalid response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// One duplex connection to an agent
#[async_trait]
pub trait RpcChannel: Send {
    /// Reads the single line the agent prints once it accepts requests
    async fn read_ready_line(&mut self) -> Result<String, ClientError>;

    async fn call(&mut self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, ClientError>;

    async fn shutdown(&mut self);
}

/// Framed JSON-RPC over any byte stream pair
pub struct StreamChannel<R, W> {
    frames: FramedRead<BufReader<R>, HeaderCodec>,
    sink: FramedWrite<W, HeaderCodec>,
    next_id: u64,
}

impl<R, W> StreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            frames: FramedRead::new(BufReader::new(reader), HeaderCodec::new()),
            sink: FramedWrite::new(writer, HeaderCodec::new()),
            next_id: 1,
        }
    }
}

#[async_trait]
impl<R, W> RpcChannel for StreamChannel<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read_ready_line(&mut self) -> Result<String, ClientError> {
        // The ready line precedes any frame, so the codec has buffered nothing yet.
        let mut line = String::new();
        let read = self.frames.get_mut().read_line(&mut line).await?;
        if read == 0 {
            return Err(ClientError::Closed);
        }
        Ok(line.trim().to_string())
    }

    async fn call(&mut self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, ClientError> {
        let id = self.next_id;
        self.next_id += 1;
        let request = match params {
            Some(arg) => JsonRpcRequest::call(id, method, arg),
            None => JsonRpcRequest::call_without_args(id, method),
        };
        let body = serde_json::to_string(&request)?;
        self.sink.send(body).await?;

        let expected = Value::from(id);
        loop {
            let frame = self.frames.next().await.ok_or(ClientError::Closed)??;
            let response: JsonRpcResponse = serde_json::from_str(&frame)?;
            if response.id.as_ref() == Some(&expected) {
                return Ok(response);
            }
            debug!("skipping response {:?} while waiting for {}", response.id, id);
        }
    }

    async fn shutdown(&mut self) {
        if let Err(e) = SinkExt::<String>::close(&mut self.sink).await {
            debug!("closing request stream failed: {e}");
        }
    }
}

/// A spawned agent process speaking over its stdin/stdout
pub struct AgentProcess {
    child: Child,
    channel: StreamChannel<ChildStdout, ChildStdin>,
}

impl AgentProcess {
    pub fn spawn(agent_path: &Path, args: &[&str]) -> std::io::Result<Self> {
        info!("starting agent {} {}", agent_path.display(), args.join(" "));
        let mut child = Command::new(agent_path)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("agent stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("agent stdout unavailable"))?;
        Ok(Self {
            child,
            channel: StreamChannel::new(stdout, stdin),
        })
    }
}

#[async_trait]
impl RpcChannel for AgentProcess {
    async fn read_ready_line(&mut self) -> Result<String, ClientError> {
        self.channel.read_ready_line().await
    }

    async fn call(&mut self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, ClientError> {
        self.channel.call(method, params).await
    }

    async fn shutdown(&mut self) {
        self.channel.shutdown().await;
        match tokio::time::timeout(Duration::from_secs(2), self.child.wait()).await {
            Ok(Ok(status)) => debug!("agent exited: {status}"),
            Ok(Err(e)) => warn!("waiting for agent failed: {e}"),
            Err(_) => {
                warn!("agent did not exit, killing it");
                if let Err(e) = self.child.kill().await {
                    warn!("failed to kill agent: {e}");
                }
            }
        }
    }
}

fn decode<T: DeserializeOwned>(method: &str, response: JsonRpcResponse) -> Result<T, ClientError> {
    if response.is_method_not_found() {
        return Err(ClientError::MethodNotFound(method.to_string()));
    }
    if let Some(error) = response.error {
        return Err(ClientError::Remote {
            code: error.code,
            message: error.message,
        });
    }
    Ok(serde_json::from_value(response.result.unwrap_or(Value::Null))?)
}

/// Typed calls over a channel; all but `RunFlow` are bounded by a timeout
pub struct AgentRpc<C> {
    channel: C,
}

impl<C: RpcChannel> AgentRpc<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub async fn read_ready_line(&mut self, timeout_ms: u64) -> Result<String, ClientError> {
        tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.channel.read_ready_line(),
        )
        .await
        .map_err(|_| ClientError::Timeout {
            method: "READY".to_string(),
            timeout_ms,
        })?
    }

    /// Raw response; JSON-RPC errors are left in the envelope.
    pub async fn raw_call(
        &mut self,
        method: &str,
        params: Option<Value>,
        timeout_ms: u64,
    ) -> Result<JsonRpcResponse, ClientError> {
        tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            self.channel.call(method, params),
        )
        .await
        .map_err(|_| ClientError::Timeout {
            method: method.to_string(),
            timeout_ms,
        })?
    }

    pub async fn invoke<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Option<Value>,
        timeout_ms: u64,
    ) -> Result<T, ClientError> {
        let response = self.raw_call(method, params, timeout_ms).await?;
        decode(method, response)
    }

    async fn invoke_with<A: Serialize, T: DeserializeOwned>(
        &mut self,
        method: &str,
        arg: &A,
        timeout_ms: u64,
    ) -> Result<T, ClientError> {
        let params = serde_json::to_value(arg)?;
        self.invoke(method, Some(params), timeout_ms).await
    }

    pub async fn ping(&mut self, timeout_ms: u64) -> Result<String, ClientError> {
        self.invoke(methods::PING, None, timeout_ms).await
    }

    /// Presence check: anything but "method not found" counts as present.
    pub async fn probe_method(&mut self, method: &str, timeout_ms: u64) -> Result<bool, ClientError> {
        let response = self.raw_call(method, Some(Value::Null), timeout_ms).await?;
        Ok(!response.is_method_not_found())
    }

    pub async fn open_session(
        &mut self,
        request: &OpenSessionRequest,
        timeout_ms: u64,
    ) -> Result<RpcResult<OpenSessionResponse>, ClientError> {
        self.invoke_with(methods::OPEN_SESSION, request, timeout_ms).await
    }

    pub async fn close_session(
        &mut self,
        session_id: &str,
        timeout_ms: u64,
    ) -> Result<RpcResult<Empty>, ClientError> {
        let request = CloseSessionRequest {
            session_id: session_id.to_string(),
        };
        self.invoke_with(methods::CLOSE_SESSION, &request, timeout_ms).await
    }

    pub async fn find_element(
        &mut self,
        request: &FindElementRequest,
        timeout_ms: u64,
    ) -> Result<RpcResult<FindElementResponse>, ClientError> {
        self.invoke_with(methods::FIND_ELEMENT, request, timeout_ms).await
    }

    /// Waits for the agent's answer however long the flow takes. The flow
    /// bounds its own waits, and an agent that dies closes the channel.
    pub async fn run_flow(&mut self, request: &RunFlowRequest) -> Result<RpcResult<RunFlowResponse>, ClientError> {
        let params = serde_json::to_value(request)?;
        let response = self.channel.call(methods::RUN_FLOW, Some(params)).await?;
        decode(methods::RUN_FLOW, response)
    }

    pub async fn shutdown(&mut self) {
        self.channel.shutdown().await;
    }
}
