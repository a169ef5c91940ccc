//! Tunnel management for the relay

use bytes::Bytes;
use porthole_common::{Frame, RequestHead, RequestId};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::correlation::{CorrelationTable, Listener};
use crate::error::RelayError;

/// Work queued by public request handlers for the session writer
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    NewRequest {
        request_id: RequestId,
        request: RequestHead,
    },
    BodyChunk {
        request_id: RequestId,
        data: Bytes,
    },
    BodyEnd {
        request_id: RequestId,
    },
}

impl From<Outbound> for Frame {
    fn from(outbound: Outbound) -> Self {
        match outbound {
            Outbound::NewRequest {
                request_id,
                request,
            } => Frame::Request {
                request_id,
                request,
            },
            Outbound::BodyChunk { request_id, data } => Frame::Data { request_id, data },
            Outbound::BodyEnd { request_id } => Frame::Close { request_id },
        }
    }
}

/// Represents an active tunnel connection
#[derive(Debug)]
pub struct Tunnel {
    subdomain: String,
    outbound: mpsc::Sender<Outbound>,
    listeners: CorrelationTable,
    shutdown: CancellationToken,
    created_at: Instant,
}

impl Tunnel {
    pub fn new(subdomain: String, outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            subdomain,
            outbound,
            listeners: CorrelationTable::new(),
            shutdown: CancellationToken::new(),
            created_at: Instant::now(),
        }
    }

    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    pub fn listeners(&self) -> &CorrelationTable {
        &self.listeners
    }

    /// Register a listener for a new public request
    pub fn open_listener(&self) -> Listener {
        self.listeners.open()
    }

    /// Queue work for the session writer
    ///
    /// Fails with `TunnelClosed` instead of blocking once the tunnel is torn down.
    pub async fn send(&self, outbound: Outbound) -> Result<(), RelayError> {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(RelayError::TunnelClosed),
            sent = self.outbound.send(outbound) => sent.map_err(|_| RelayError::TunnelClosed),
        }
    }

    /// Signal teardown and unblock every handler waiting on this tunnel
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            debug!(
                "Shutting down tunnel {} after {:?}",
                self.subdomain,
                self.created_at.elapsed()
            );
        }
        self.shutdown.cancel();
        self.listeners.close_all();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves once the tunnel is shutting down
    pub async fn closed(&self) {
        self.shutdown.cancelled().await
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::ListenerEvent;

    #[test]
    fn test_outbound_into_frame() {
        let frame: Frame = Outbound::BodyChunk {
            request_id: 4,
            data: Bytes::from_static(b"abc"),
        }
        .into();
        assert_eq!(
            frame,
            Frame::Data {
                request_id: 4,
                data: Bytes::from_static(b"abc")
            }
        );

        let frame: Frame = Outbound::BodyEnd { request_id: 4 }.into();
        assert_eq!(frame, Frame::Close { request_id: 4 });

        let head = RequestHead::new("GET", "/", "abcde.example.com");
        let frame: Frame = Outbound::NewRequest {
            request_id: 5,
            request: head.clone(),
        }
        .into();
        assert_eq!(
            frame,
            Frame::Request {
                request_id: 5,
                request: head
            }
        );
    }

    #[tokio::test]
    async fn test_send_reaches_writer_queue() {
        let (tx, mut rx) = mpsc::channel(4);
        let tunnel = Tunnel::new("abcde".to_string(), tx);

        tunnel
            .send(Outbound::BodyEnd { request_id: 1 })
            .await
            .unwrap();
        assert_eq!(rx.recv().await, Some(Outbound::BodyEnd { request_id: 1 }));
    }

    #[tokio::test]
    async fn test_send_after_shutdown_does_not_block() {
        // A full queue with nobody draining it would block forever
        let (tx, _rx) = mpsc::channel(1);
        let tunnel = Tunnel::new("abcde".to_string(), tx);
        tunnel
            .send(Outbound::BodyEnd { request_id: 1 })
            .await
            .unwrap();

        tunnel.shutdown();
        let result = tunnel.send(Outbound::BodyEnd { request_id: 2 }).await;
        assert!(matches!(result, Err(RelayError::TunnelClosed)));
        assert!(tunnel.is_closed());
    }

    #[tokio::test]
    async fn test_blocked_send_unblocks_on_shutdown() {
        let (tx, _rx) = mpsc::channel(1);
        let tunnel = std::sync::Arc::new(Tunnel::new("abcde".to_string(), tx));
        tunnel
            .send(Outbound::BodyEnd { request_id: 1 })
            .await
            .unwrap();

        let blocked = {
            let tunnel = tunnel.clone();
            tokio::spawn(async move { tunnel.send(Outbound::BodyEnd { request_id: 2 }).await })
        };
        tokio::task::yield_now().await;
        tunnel.shutdown();

        let result = blocked.await.unwrap();
        assert!(matches!(result, Err(RelayError::TunnelClosed)));
    }

    #[tokio::test]
    async fn test_shutdown_releases_listeners() {
        let (tx, _rx) = mpsc::channel(1);
        let tunnel = Tunnel::new("abcde".to_string(), tx);
        let mut listener = tunnel.open_listener();

        tunnel.shutdown();
        let event: Option<ListenerEvent> = listener.recv().await;
        assert!(event.is_none());
        assert!(tunnel.listeners().is_empty());
    }
}
