//! Wire-level pieces: header framing, envelopes, error mapping and contracts

use crate::errors::AutomationError;
use crate::rpc::envelope::METHOD_NOT_FOUND;
use crate::rpc::{
    create_error, ErrorKind, FramingError, HeaderCodec, JsonRpcRequest, JsonRpcResponse,
    OpenSessionRequest, RunFlowRequest, SetTextMode,
};
use bytes::BytesMut;
use serde_json::json;
use tokio_util::codec::{Decoder, Encoder};

#[test]
fn decodes_a_frame_split_across_reads() {
    let mut codec = HeaderCodec::new();
    let mut buf = BytesMut::from(&b"Content-Length: 17\r\nContent-Type: application/json\r\n\r\n{\"jsonrpc\":"[..]);

    assert_eq!(codec.decode(&mut buf).unwrap(), None);
    buf.extend_from_slice(b"\"2.0\"}");
    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("{\"jsonrpc\":\"2.0\"}"));
    assert!(buf.is_empty());
}

#[test]
fn decodes_back_to_back_frames() {
    let mut codec = HeaderCodec::new();
    let mut buf = BytesMut::new();
    codec.encode("[1]", &mut buf).unwrap();
    codec.encode("[22]", &mut buf).unwrap();
    assert!(buf.starts_with(b"Content-Length: 3\r\n\r\n[1]"));

    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("[1]"));
    assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("[22]"));
    assert_eq!(codec.decode(&mut buf).unwrap(), None);
}

#[test]
fn rejects_frames_without_length_or_over_the_limit() {
    let mut codec = HeaderCodec::new();
    let mut buf = BytesMut::from(&b"Content-Type: application/json\r\n\r\n{}"[..]);
    assert!(matches!(
        codec.decode(&mut buf),
        Err(FramingError::MissingContentLength)
    ));

    let mut small = HeaderCodec::with_max_frame_bytes(4);
    let mut buf = BytesMut::from(&b"Content-Length: 10\r\n\r\n"[..]);
    assert!(matches!(
        small.decode(&mut buf),
        Err(FramingError::FrameTooLarge(10, 4))
    ));
}

#[test]
fn request_argument_accepts_positional_and_named_params() {
    let positional = JsonRpcRequest::call(1, "CloseSession", json!({"sessionId": "abc"}));
    assert_eq!(positional.argument(), json!({"sessionId": "abc"}));

    let named: JsonRpcRequest = serde_json::from_value(json!({
        "jsonrpc": "2.0", "id": 2, "method": "CloseSession", "params": {"sessionId": "abc"}
    }))
    .unwrap();
    assert_eq!(named.argument(), json!({"sessionId": "abc"}));

    let empty = JsonRpcRequest::call_without_args(3, "Ping");
    let parsed: Option<OpenSessionRequest> = empty.parse_argument().unwrap();
    assert!(parsed.is_none());
    assert!(!empty.is_notification());
}

#[test]
fn request_defaults_follow_the_contract() {
    let open: OpenSessionRequest = serde_json::from_value(json!({"processName": "Autothink"})).unwrap();
    assert_eq!(open.timeout_ms, 10_000);
    assert!(open.bring_to_foreground);

    let run: RunFlowRequest = serde_json::from_value(json!({"sessionId": "s", "flowName": "f"})).unwrap();
    assert_eq!(run.timeout_ms, 30_000);
    assert!(run.args.is_none());

    assert_eq!(SetTextMode::parse(None), Some(SetTextMode::Replace));
    assert_eq!(SetTextMode::parse(Some("ctrlareplace")), Some(SetTextMode::CtrlAReplace));
    assert_eq!(SetTextMode::parse(Some("Overwrite")), None);
}

#[test]
fn create_error_records_the_cause() {
    let cause = AutomationError::ElementNotEnabled("buildButton".to_string());
    let error = create_error(ErrorKind::ActionError, "Click failed", &cause);

    assert_eq!(error.detail("exceptionType"), Some("ElementNotEnabled"));
    assert_eq!(
        error.detail("exceptionMessage"),
        Some("Element is not enabled: buildButton")
    );

    let wire = serde_json::to_value(&error).unwrap();
    assert_eq!(wire["kind"], "ActionError");
    assert_eq!(wire["message"], "Click failed");
}

#[test]
fn recoverable_kinds_exclude_configuration_errors() {
    assert!(ErrorKind::FindError.is_recoverable());
    assert!(ErrorKind::UnexpectedUIState.is_recoverable());
    assert!(!ErrorKind::InvalidArgument.is_recoverable());
    assert!(!ErrorKind::ConfigError.is_recoverable());
    assert!(!ErrorKind::NotImplemented.is_recoverable());
}

#[test]
fn error_response_serializes_code() {
    let response = JsonRpcResponse::error(Some(json!(7)), METHOD_NOT_FOUND, "Method not found: Nope");
    assert!(response.is_method_not_found());
    let wire = serde_json::to_value(&response).unwrap();
    assert_eq!(wire["error"]["code"], -32601);
    assert!(wire.get("result").is_none());
}
