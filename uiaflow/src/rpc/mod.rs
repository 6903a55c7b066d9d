//! Wire boundary: payload contracts, the public error taxonomy, JSON-RPC
//! envelopes and header framing.

pub mod contracts;
pub mod envelope;
pub mod error;
pub mod framing;

pub use contracts::*;
pub use envelope::{JsonRpcRequest, JsonRpcResponse};
pub use error::{create_error, map_find_failure, ErrorKind, RpcError};
pub use framing::{FramingError, HeaderCodec};

/// Method names served by the agent
pub mod methods {
    pub const PING: &str = "Ping";
    pub const OPEN_SESSION: &str = "OpenSession";
    pub const CLOSE_SESSION: &str = "CloseSession";
    pub const FIND_ELEMENT: &str = "FindElement";
    pub const CLICK: &str = "Click";
    pub const DOUBLE_CLICK: &str = "DoubleClick";
    pub const RIGHT_CLICK: &str = "RightClick";
    pub const SET_TEXT: &str = "SetText";
    pub const SEND_KEYS: &str = "SendKeys";
    pub const WAIT_UNTIL: &str = "WaitUntil";
    pub const RUN_FLOW: &str = "RunFlow";

    pub const ALL: [&str; 11] = [
        PING,
        OPEN_SESSION,
        CLOSE_SESSION,
        FIND_ELEMENT,
        CLICK,
        DOUBLE_CLICK,
        RIGHT_CLICK,
        SET_TEXT,
        SEND_KEYS,
        WAIT_UNTIL,
        RUN_FLOW,
    ];
}
