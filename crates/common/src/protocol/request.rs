use serde::{Deserialize, Serialize};

use super::HeaderMultimap;

/// Everything the agent needs to replay a public request against the local service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHead {
    /// HTTP method (GET, POST, PUT, DELETE, etc.)
    pub method: String,

    /// Request path including query string
    /// Example: "/api/v1/users?limit=10"
    pub path: String,

    /// HTTP headers as a map of header name to list of values
    pub headers: HeaderMultimap,

    /// Host header the public caller used
    #[serde(default)]
    pub host: String,

    /// Whether `data` frames will carry a body; `close` ends the body either way
    #[serde(default)]
    pub has_body: bool,
}

impl RequestHead {
    /// Create a request head without headers
    pub fn new(method: impl Into<String>, path: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HeaderMultimap::new(),
            host: host.into(),
            has_body: false,
        }
    }
}
