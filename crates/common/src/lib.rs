//! Common utilities and types for porthole
//!
//! This crate provides the wire protocol and helpers shared by the relay (the
//! public broker) and the agent (the process next to the local service).

pub mod constants;
pub mod error;
pub mod protocol;
pub mod utils;
pub mod validation;

// Re-export commonly used types for convenience
pub use error::{Result, TunnelError};
pub use protocol::{Frame, HeaderMultimap, RequestHead, RequestId, ResponseHead, decode, encode};
pub use utils::{generate_subdomain, headers_to_map, is_hop_by_hop, map_to_headers, split_chunks};
