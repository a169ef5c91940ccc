//! Porthole relay
//!
//! Accepts tunnel connections from agents on `/start` and proxies public HTTP
//! traffic for `<subdomain>.<domain>` through the matching tunnel.

use anyhow::Result;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub mod config;
pub mod correlation;
pub mod error;
pub mod registry;
pub mod router;
pub mod session;
pub mod tunnel;

pub use config::RelayConfig;
pub use error::RelayError;
pub use registry::Registry;

/// State shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            config: Arc::new(config),
        }
    }
}

/// Build the relay's HTTP application
pub fn app(state: AppState) -> Router {
    Router::new().fallback(router::route).with_state(state)
}

/// Serve the relay on `listener` until `shutdown` resolves, then close every tunnel
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = state.registry.clone();
    info!(
        "Relay listening on {} (domain: {})",
        listener.local_addr()?,
        state.config.domain
    );

    axum::serve(listener, app(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            registry.shutdown_all().await;
        })
        .await?;

    Ok(())
}
