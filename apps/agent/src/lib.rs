//! Agent side of a porthole tunnel: registers with a relay over one
//! WebSocket and serves forwarded requests against a local HTTP service.

pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod tunnel;

pub use config::{AgentConfig, Args};
pub use tunnel::Tunnel;
