use anyhow::Result;
use clap::Parser;
use porthole::{AgentConfig, Args, Tunnel};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    info!("Starting porthole agent v{}", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::from_args(args)?;
    let tunnel = Tunnel::connect(&config).await?;

    println!(
        "Started tunnel: {} --> {}",
        tunnel.public_url(),
        config.local_address
    );

    tokio::select! {
        reason = tunnel.wait() => {
            eprintln!("Disconnected from relay: {}", reason);
            std::process::exit(1);
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutting down");
        }
    }

    Ok(())
}
