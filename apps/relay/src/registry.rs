//! Subdomain registry
//!
//! Owns the mapping from public subdomain to live [`Tunnel`]. Lookups happen on
//! every public request while registrations only on agent connect/disconnect,
//! so the map sits behind a read-write lock.

use porthole_common::constants::SUBDOMAIN_SLUG_ATTEMPTS;
use porthole_common::generate_subdomain;
use porthole_common::validation::validate_subdomain;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};

use crate::error::RelayError;
use crate::tunnel::{Outbound, Tunnel};

#[derive(Debug, Default)]
pub struct Registry {
    tunnels: RwLock<HashMap<String, Arc<Tunnel>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tunnel under the requested subdomain, or a random one
    ///
    /// An empty request counts as no request. Auto-generated slugs are retried a
    /// bounded number of times when they happen to be taken.
    pub async fn register(
        &self,
        requested: Option<&str>,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<Arc<Tunnel>, RelayError> {
        match requested.filter(|name| !name.is_empty()) {
            Some(name) => {
                validate_subdomain(name)
                    .map_err(|_| RelayError::InvalidSubdomain(name.chars().take(63).collect()))?;
                self.try_insert(name.to_string(), outbound)
                    .await
                    .ok_or_else(|| RelayError::Conflict(name.to_string()))
            }
            None => {
                for _ in 0..SUBDOMAIN_SLUG_ATTEMPTS {
                    let candidate = generate_subdomain();
                    if let Some(tunnel) = self.try_insert(candidate.clone(), outbound.clone()).await
                    {
                        return Ok(tunnel);
                    }
                    debug!("Generated subdomain {} is taken, retrying", candidate);
                }
                Err(RelayError::SubdomainsExhausted)
            }
        }
    }

    async fn try_insert(
        &self,
        subdomain: String,
        outbound: mpsc::Sender<Outbound>,
    ) -> Option<Arc<Tunnel>> {
        let mut tunnels = self.tunnels.write().await;
        match tunnels.entry(subdomain) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let tunnel = Arc::new(Tunnel::new(slot.key().clone(), outbound));
                slot.insert(tunnel.clone());
                info!("Registered tunnel {}", tunnel.subdomain());
                Some(tunnel)
            }
        }
    }

    pub async fn lookup(&self, subdomain: &str) -> Result<Arc<Tunnel>, RelayError> {
        self.tunnels
            .read()
            .await
            .get(subdomain)
            .cloned()
            .ok_or_else(|| RelayError::NotFound(subdomain.to_string()))
    }

    /// Remove whatever tunnel holds `subdomain`; idempotent
    pub async fn deregister(&self, subdomain: &str) -> Option<Arc<Tunnel>> {
        let removed = self.tunnels.write().await.remove(subdomain);
        if removed.is_some() {
            info!("Deregistered tunnel {}", subdomain);
        }
        removed
    }

    /// Remove `tunnel` only if its subdomain still points at this instance
    pub async fn release(&self, tunnel: &Arc<Tunnel>) -> bool {
        let mut tunnels = self.tunnels.write().await;
        match tunnels.get(tunnel.subdomain()) {
            Some(current) if Arc::ptr_eq(current, tunnel) => {
                tunnels.remove(tunnel.subdomain());
                info!("Deregistered tunnel {}", tunnel.subdomain());
                true
            }
            _ => false,
        }
    }

    /// Unregister and shut down every tunnel, used when the relay stops
    pub async fn shutdown_all(&self) {
        let tunnels: Vec<Arc<Tunnel>> = self
            .tunnels
            .write()
            .await
            .drain()
            .map(|(_, tunnel)| tunnel)
            .collect();
        info!("Shutting down {} tunnel(s)", tunnels.len());
        for tunnel in tunnels {
            tunnel.shutdown();
        }
    }

    pub async fn len(&self) -> usize {
        self.tunnels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tunnels.read().await.is_empty()
    }
}
