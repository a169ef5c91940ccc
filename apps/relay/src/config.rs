use clap::Parser;
use std::net::SocketAddr;

/// CLI arguments for the relay
#[derive(Parser, Debug)]
#[command(name = "porthole-relay")]
#[command(about = "Public relay for porthole tunnels", long_about = None)]
#[command(version)]
pub struct Args {
    /// Public domain of the relay; tunnels live on its subdomains
    #[arg(long, env = "PORTHOLE_DOMAIN", default_value = "localhost")]
    pub domain: String,

    /// Address to listen on for public and agent traffic
    #[arg(long, env = "PORTHOLE_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// Configuration for the relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Bare relay host, lowercase, without port or trailing dot
    pub domain: String,

    /// Listen address
    pub bind: SocketAddr,
}

impl RelayConfig {
    pub fn new(domain: &str, bind: SocketAddr) -> Self {
        Self {
            domain: normalize_host(domain),
            bind,
        }
    }

    pub fn from_args(args: &Args) -> Self {
        Self::new(&args.domain, args.bind)
    }

    /// Whether a Host header value addresses the relay itself rather than a tunnel
    pub fn is_relay_host(&self, host: &str) -> bool {
        normalize_host(host) == self.domain
    }
}

/// Lowercase a Host value and strip its port and trailing dot
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if host.starts_with('[') {
        // IPv6 literal, keep the brackets
        match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        }
    } else {
        host.split(':').next().unwrap_or(host)
    };
    without_port.trim_end_matches('.').to_ascii_lowercase()
}
