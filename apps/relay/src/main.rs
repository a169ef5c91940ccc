use anyhow::Result;
use clap::Parser;
use porthole_relay::config::{Args, RelayConfig};
use porthole_relay::{AppState, serve};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    info!("Porthole relay v{}", env!("CARGO_PKG_VERSION"));

    let config = RelayConfig::from_args(&args);
    let listener = TcpListener::bind(config.bind).await?;
    let state = AppState::new(config);

    serve(listener, state, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down gracefully..."),
            Err(e) => {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await
            }
        }
    })
    .await
}
