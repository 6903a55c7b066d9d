use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use uiaflow::platforms::memory::MemoryEngine;
use uiaflow::rpc::envelope::{INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR};
use uiaflow::rpc::{HeaderCodec, JsonRpcRequest, JsonRpcResponse};
use uiaflow::UiaRpcService;
use uiaflow_agent::{create_engine, serve, EngineKind};

struct Client {
    frames: FramedRead<ReadHalf<DuplexStream>, HeaderCodec>,
    sink: FramedWrite<WriteHalf<DuplexStream>, HeaderCodec>,
    server: JoinHandle<anyhow::Result<()>>,
}

impl Client {
    fn start() -> Self {
        let engine = MemoryEngine::demo().expect("demo tree");
        let service = Arc::new(UiaRpcService::new(Arc::new(engine)));
        let (client, server) = tokio::io::duplex(64 * 1024);
        let (server_read, server_write) = tokio::io::split(server);
        let server = tokio::spawn(serve(service, server_read, server_write));
        let (client_read, client_write) = tokio::io::split(client);
        Self {
            frames: FramedRead::new(client_read, HeaderCodec::new()),
            sink: FramedWrite::new(client_write, HeaderCodec::new()),
            server,
        }
    }

    async fn send_raw(&mut self, body: &str) {
        self.sink.send(body).await.expect("frame sent");
    }

    async fn call(&mut self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let body = serde_json::to_string(request).expect("request encodes");
        self.send_raw(&body).await;
        self.next_response().await
    }

    async fn next_response(&mut self) -> JsonRpcResponse {
        let frame = self
            .frames
            .next()
            .await
            .expect("server replied")
            .expect("frame decodes");
        serde_json::from_str(&frame).expect("response parses")
    }

    async fn finish(self) -> anyhow::Result<()> {
        drop(self.frames);
        drop(self.sink);
        self.server.await.expect("server task joins")
    }
}

#[tokio::test]
async fn test_ping_and_session_round_trip() {
    let mut client = Client::start();

    let pong = client
        .call(&JsonRpcRequest::call_without_args(1, "Ping"))
        .await;
    assert_eq!(pong.id, Some(json!(1)));
    assert_eq!(pong.result, Some(json!("pong")));

    let opened = client
        .call(&JsonRpcRequest::call(
            2,
            "OpenSession",
            json!({ "processName": "Autothink.DemoTarget", "timeoutMs": 1000 }),
        ))
        .await;
    let result = opened.result.expect("result");
    assert_eq!(result["ok"], json!(true));
    let session_id = result["value"]["sessionId"].as_str().expect("session id").to_string();

    let flow = client
        .call(&JsonRpcRequest::call(
            3,
            "RunFlow",
            json!({ "sessionId": session_id, "flowName": "autothink.attach", "argsJson": "{}" }),
        ))
        .await;
    let result = flow.result.expect("result");
    assert_eq!(result["ok"], json!(true));
    assert_eq!(result["value"]["data"]["processId"], json!(4242));

    client.finish().await.expect("clean shutdown");
}

#[tokio::test]
async fn test_wire_level_errors() {
    let mut client = Client::start();

    client.send_raw("{ this is not json").await;
    let parse = client.next_response().await;
    assert_eq!(parse.error.as_ref().map(|e| e.code), Some(PARSE_ERROR));
    assert_eq!(parse.id, None);

    client.send_raw(r#"{"id": 7, "method": 12}"#).await;
    let invalid = client.next_response().await;
    assert_eq!(invalid.error.as_ref().map(|e| e.code), Some(INVALID_REQUEST));
    assert_eq!(invalid.id, Some(json!(7)));

    let missing = client
        .call(&JsonRpcRequest::call_without_args(8, "Shutdown"))
        .await;
    assert_eq!(missing.error.as_ref().map(|e| e.code), Some(METHOD_NOT_FOUND));

    client.finish().await.expect("clean shutdown");
}

#[tokio::test]
async fn test_notifications_are_not_answered() {
    let mut client = Client::start();

    let notification: Value = json!({ "jsonrpc": "2.0", "method": "Ping" });
    client.send_raw(&notification.to_string()).await;
    let reply = client
        .call(&JsonRpcRequest::call_without_args(9, "Ping"))
        .await;

    assert_eq!(reply.id, Some(json!(9)));
    client.finish().await.expect("clean shutdown");
}

#[tokio::test]
async fn test_requests_split_across_writes() {
    let mut client = Client::start();

    let body = serde_json::to_string(&JsonRpcRequest::call_without_args(10, "Ping")).unwrap();
    let framed = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
    let (head, tail) = framed.split_at(framed.len() / 2);

    use tokio::io::AsyncWriteExt;
    let writer = client.sink.get_mut();
    writer.write_all(head.as_bytes()).await.unwrap();
    writer.flush().await.unwrap();
    writer.write_all(tail.as_bytes()).await.unwrap();
    writer.flush().await.unwrap();

    let reply = client.next_response().await;
    assert_eq!(reply.result, Some(json!("pong")));
    client.finish().await.expect("clean shutdown");
}

#[test]
fn test_memory_engine_from_tree_file() {
    let tree = json!({
        "processes": [{
            "pid": 31,
            "name": "Custom",
            "mainWindow": { "name": "Custom Main", "controlType": "Window" }
        }]
    });
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{tree}").unwrap();

    let engine = create_engine(EngineKind::Memory, Some(file.path())).expect("engine");
    let processes = engine.find_processes("custom.exe").unwrap();
    assert_eq!(processes.len(), 1);
    assert_eq!(processes[0].main_window_title.as_deref(), Some("Custom Main"));
}

#[test]
fn test_memory_engine_rejects_bad_tree_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[1, 2").unwrap();

    let error = create_engine(EngineKind::Memory, Some(file.path()))
        .err()
        .expect("invalid tree is rejected");
    assert!(error.to_string().contains("invalid tree file"));
}
