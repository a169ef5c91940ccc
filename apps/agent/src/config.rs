use clap::Parser;
use porthole_common::constants::{
    HEARTBEAT_INTERVAL_SECS, LOCAL_REQUEST_TIMEOUT_SECS, REGISTRATION_PATH, SUBDOMAIN_QUERY_PARAM,
};
use porthole_common::{Result, TunnelError};
use std::time::Duration;
use url::Url;

/// CLI arguments for the agent
#[derive(Parser, Debug)]
#[command(name = "porthole")]
#[command(about = "Expose a local HTTP service through a porthole relay", long_about = None)]
#[command(version)]
pub struct Args {
    /// Local port to tunnel to
    #[arg(short, long)]
    pub port: u16,

    /// Request a custom subdomain
    #[arg(short, long)]
    pub subdomain: Option<String>,

    /// Relay host to connect to
    #[arg(long, env = "PORTHOLE_HOST", default_value = "localhost:8080")]
    pub host: String,

    /// Local host address
    #[arg(long, default_value = "127.0.0.1")]
    pub local_host: String,

    /// [ADVANCED] don't tunnel over TLS
    #[arg(long, hide = true)]
    pub insecure: bool,

    /// Connection timeout in seconds
    #[arg(long, default_value = "10")]
    pub connect_timeout: u64,

    /// Local request timeout in seconds
    #[arg(long, default_value_t = LOCAL_REQUEST_TIMEOUT_SECS)]
    pub request_timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Configuration for the agent
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Registration endpoint, e.g. "wss://relay.example.com/start?subdomain=haas"
    pub relay_url: Url,

    /// Relay host as given, used to build the public URL
    pub relay_host: String,

    /// Whether the tunnel runs over TLS
    pub secure: bool,

    /// Local service address (e.g., "http://127.0.0.1:3000")
    pub local_address: String,

    /// Timeout for the registration handshake
    pub connect_timeout: Duration,

    /// Whole-call deadline for each local request
    pub request_timeout: Duration,

    /// Interval between transport pings
    pub heartbeat_interval: Duration,
}

impl AgentConfig {
    pub fn new(
        relay_host: &str,
        secure: bool,
        subdomain: Option<&str>,
        local_address: String,
    ) -> Result<Self> {
        Ok(Self {
            relay_url: registration_url(relay_host, secure, subdomain)?,
            relay_host: relay_host.to_string(),
            secure,
            local_address: local_address.trim_end_matches('/').to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(LOCAL_REQUEST_TIMEOUT_SECS),
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
        })
    }

    pub fn from_args(args: Args) -> Result<Self> {
        let mut config = Self::new(
            &args.host,
            !args.insecure,
            args.subdomain.as_deref(),
            format!("http://{}:{}", args.local_host, args.port),
        )?;
        config.connect_timeout = Duration::from_secs(args.connect_timeout);
        config.request_timeout = Duration::from_secs(args.request_timeout);
        Ok(config)
    }

    /// Public URL of a tunnel assigned `subdomain`
    pub fn public_url(&self, subdomain: &str) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}.{}", scheme, subdomain, self.relay_host)
    }
}

fn registration_url(relay_host: &str, secure: bool, subdomain: Option<&str>) -> Result<Url> {
    let scheme = if secure { "wss" } else { "ws" };
    let mut url = Url::parse(&format!("{}://{}{}", scheme, relay_host, REGISTRATION_PATH))
        .map_err(|e| TunnelError::Connection(format!("Invalid relay host {}: {}", relay_host, e)))?;

    if let Some(subdomain) = subdomain.filter(|s| !s.is_empty()) {
        url.query_pairs_mut()
            .append_pair(SUBDOMAIN_QUERY_PARAM, subdomain);
    }

    Ok(url)
}
