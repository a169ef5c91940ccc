use axum::response::{IntoResponse, Response};
use http::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

/// Text shown to public callers when the agent cannot reach its local service
pub const PROXY_ERROR_TEXT: &str = "Proxy error. See your terminal for more information.";

/// Errors the relay turns into HTTP responses
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Tunnel {0} not found.\n\nStart it with `porthole -p PORT -s {0}`")]
    NotFound(String),

    #[error("Tunnel is already running")]
    Conflict(String),

    #[error("No free subdomain found, try again")]
    SubdomainsExhausted,

    #[error("Invalid subdomain: {0}")]
    InvalidSubdomain(String),

    #[error("Tunnel closed before responding")]
    TunnelClosed,

    #[error("{}", PROXY_ERROR_TEXT)]
    ProxyError,

    #[error("Agent sent an invalid status code: {0}")]
    InvalidStatus(u16),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Conflict(_) | RelayError::SubdomainsExhausted => StatusCode::CONFLICT,
            RelayError::InvalidSubdomain(_) => StatusCode::BAD_REQUEST,
            RelayError::TunnelClosed | RelayError::ProxyError | RelayError::InvalidStatus(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!("Responding {}: {}", status, self);
        } else {
            debug!("Responding {}: {}", status, self);
        }
        (status, self.to_string()).into_response()
    }
}
