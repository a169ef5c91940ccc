use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{RequestHead, RequestId, ResponseHead};

/// One protocol message; exactly one frame travels in each WebSocket message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Relay -> agent, sent once right after the upgrade
    Subdomain { subdomain: String },

    /// Relay -> agent, announces a new proxied call
    Request {
        request_id: RequestId,
        request: RequestHead,
    },

    /// Either direction, one ordered body chunk
    Data { request_id: RequestId, data: Bytes },

    /// Either direction, end of body for this request and direction
    Close { request_id: RequestId },

    /// Agent -> relay, status and headers; always precedes the response body
    Response {
        request_id: RequestId,
        response: ResponseHead,
    },

    /// Agent -> relay, the local service could not be reached; terminal
    ProxyError {
        request_id: RequestId,
        #[serde(default)]
        message: String,
    },

    /// Relay -> agent, terminal for the whole tunnel
    Error { error: String },
}

impl Frame {
    /// The request this frame belongs to, if it is a per-request frame
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Frame::Request { request_id, .. }
            | Frame::Data { request_id, .. }
            | Frame::Close { request_id }
            | Frame::Response { request_id, .. }
            | Frame::ProxyError { request_id, .. } => Some(*request_id),
            Frame::Subdomain { .. } | Frame::Error { .. } => None,
        }
    }

    /// Short name of the frame type, as it appears in the `type` tag
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Subdomain { .. } => "subdomain",
            Frame::Request { .. } => "request",
            Frame::Data { .. } => "data",
            Frame::Close { .. } => "close",
            Frame::Response { .. } => "response",
            Frame::ProxyError { .. } => "proxy_error",
            Frame::Error { .. } => "error",
        }
    }
}
