use serde::{Deserialize, Serialize};

use super::HeaderMultimap;

/// Status line and headers of the local service's response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseHead {
    /// HTTP status code (200, 404, 500, etc.)
    pub status: u16,

    /// Response headers as a map of header name to list of values
    pub headers: HeaderMultimap,
}

impl ResponseHead {
    /// Create a response head without headers
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HeaderMultimap::new(),
        }
    }
}
