//! Tunnel session: registration handshake plus the per-connection reader and writer
//!
//! The writer task is the only owner of the WebSocket sink, so frames from any
//! number of request handlers reach the wire one whole message at a time. The
//! reader runs on the upgraded connection's own task and tears the tunnel down
//! when it stops.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, Query, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use porthole_common::constants::{MAX_MESSAGE_SIZE, OUTBOUND_QUEUE_DEPTH};
use porthole_common::{Frame, decode, encode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::AppState;
use crate::correlation::ListenerEvent;
use crate::registry::Registry;
use crate::tunnel::{Outbound, Tunnel};

/// How long a closing session waits to say goodbye to its agent
const FAREWELL_TIMEOUT: Duration = Duration::from_secs(5);

/// Query string of the registration endpoint
#[derive(Debug, Default, Deserialize)]
pub struct RegistrationParams {
    pub subdomain: Option<String>,
}

/// Why a session's reader stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The agent closed the connection
    Disconnected,
    /// Reading from the transport failed
    Transport(String),
    /// The agent sent something that is not a valid frame
    Violation(String),
    /// The tunnel was shut down from the relay side
    Shutdown,
}

impl SessionEnd {
    /// Message for a final `error` frame, if the agent should get one
    fn farewell(&self) -> Option<String> {
        match self {
            SessionEnd::Violation(reason) => Some(format!("Protocol violation: {}", reason)),
            SessionEnd::Shutdown => Some("Relay is shutting down".to_string()),
            SessionEnd::Disconnected | SessionEnd::Transport(_) => None,
        }
    }
}

/// Handle `GET /start`: register a tunnel, then upgrade to the tunnel connection
pub async fn handle_registration(state: AppState, req: Request) -> Response {
    let (mut parts, _body) = req.into_parts();

    let params = Query::<RegistrationParams>::try_from_uri(&parts.uri)
        .map(|Query(params)| params)
        .unwrap_or_default();

    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            debug!("Registration without a valid upgrade: {}", rejection.body_text());
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
    let tunnel = match state
        .registry
        .register(params.subdomain.as_deref(), outbound_tx)
        .await
    {
        Ok(tunnel) => tunnel,
        Err(e) => return e.into_response(),
    };

    let registry = state.registry.clone();
    let failed = (registry.clone(), tunnel.clone());

    upgrade
        .max_message_size(MAX_MESSAGE_SIZE)
        .on_failed_upgrade(move |e| {
            let (registry, tunnel) = failed;
            warn!("Upgrade for tunnel {} failed: {}", tunnel.subdomain(), e);
            tunnel.shutdown();
            tokio::spawn(async move {
                registry.release(&tunnel).await;
            });
        })
        .on_upgrade(move |socket| run_session(socket, tunnel, outbound_rx, registry))
}

/// Drive one tunnel connection until it ends, then tear everything down
pub async fn run_session(
    socket: WebSocket,
    tunnel: Arc<Tunnel>,
    outbound_rx: mpsc::Receiver<Outbound>,
    registry: Arc<Registry>,
) {
    let (mut sink, stream) = socket.split();

    let assigned = Frame::Subdomain {
        subdomain: tunnel.subdomain().to_string(),
    };
    if let Err(e) = send_frame(&mut sink, &assigned).await {
        error!("Failed to send subdomain to agent: {}", e);
        tunnel.shutdown();
        registry.release(&tunnel).await;
        return;
    }
    info!("Tunnel active: {}", tunnel.subdomain());

    let writer = tokio::spawn(write_loop(sink, outbound_rx, tunnel.shutdown_token()));
    let end = read_loop(stream, &tunnel).await;

    match &end {
        SessionEnd::Disconnected | SessionEnd::Shutdown => {
            info!("Tunnel {} closed: {:?}", tunnel.subdomain(), end)
        }
        SessionEnd::Transport(e) => warn!("Tunnel {} transport error: {}", tunnel.subdomain(), e),
        SessionEnd::Violation(e) => error!("Tunnel {} protocol violation: {}", tunnel.subdomain(), e),
    }

    tunnel.shutdown();
    registry.release(&tunnel).await;

    match writer.await {
        Ok(mut sink) => {
            let goodbye = async {
                if let Some(error) = end.farewell() {
                    let _ = send_frame(&mut sink, &Frame::Error { error }).await;
                }
                let _ = sink.close().await;
            };
            if tokio::time::timeout(FAREWELL_TIMEOUT, goodbye).await.is_err() {
                debug!("Agent of {} stopped reading, dropping socket", tunnel.subdomain());
            }
        }
        Err(e) => error!("Writer task for {} failed: {}", tunnel.subdomain(), e),
    }
}

async fn send_frame<S>(sink: &mut S, frame: &Frame) -> anyhow::Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let bytes = encode(frame)?;
    sink.send(Message::Binary(bytes)).await?;
    Ok(())
}

/// Sole writer: drain queued work onto the wire until shutdown
///
/// Shutdown also interrupts a write that is stuck on an agent which stopped
/// reading.
async fn write_loop<S>(
    mut sink: S,
    mut outbound_rx: mpsc::Receiver<Outbound>,
    shutdown: CancellationToken,
) -> S
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    loop {
        let outbound = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            outbound = outbound_rx.recv() => match outbound {
                Some(outbound) => outbound,
                None => break,
            },
        };

        let frame = Frame::from(outbound);
        debug!("-> {} {:?}", frame.kind(), frame.request_id());
        let sent = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            sent = send_frame(&mut sink, &frame) => sent,
        };
        if let Err(e) = sent {
            warn!("Failed to write frame: {}", e);
            shutdown.cancel();
            break;
        }
    }

    debug!("Write task exiting");
    sink
}

async fn read_loop(mut stream: SplitStream<WebSocket>, tunnel: &Tunnel) -> SessionEnd {
    loop {
        let message = tokio::select! {
            _ = tunnel.closed() => return SessionEnd::Shutdown,
            message = stream.next() => message,
        };

        match message {
            Some(Ok(Message::Binary(bytes))) => {
                let frame = match decode(&bytes) {
                    Ok(frame) => frame,
                    Err(e) => return SessionEnd::Violation(e.to_string()),
                };
                dispatch(tunnel, frame);
            }
            Some(Ok(Message::Text(_))) => {
                return SessionEnd::Violation("text messages are not frames".to_string());
            }
            Some(Ok(Message::Close(_))) | None => return SessionEnd::Disconnected,
            Some(Ok(_)) => {} // ping/pong are answered by the transport
            Some(Err(e)) => return SessionEnd::Transport(e.to_string()),
        }
    }
}

/// Route one frame from the agent to the listener waiting for it
///
/// Never blocks on a listener, so one slow public caller cannot hold up the
/// other requests sharing the tunnel.
pub(crate) fn dispatch(tunnel: &Tunnel, frame: Frame) {
    debug!("<- {} {:?}", frame.kind(), frame.request_id());
    let listeners = tunnel.listeners();

    match frame {
        Frame::Response {
            request_id,
            response,
        } => {
            listeners.deliver(request_id, ListenerEvent::Response(response));
        }
        Frame::Data { request_id, data } => {
            listeners.deliver(request_id, ListenerEvent::Data(data));
        }
        Frame::Close { request_id } => {
            listeners.finish(request_id);
        }
        Frame::ProxyError {
            request_id,
            message,
        } => {
            listeners.deliver(request_id, ListenerEvent::ProxyError(message));
            listeners.finish(request_id);
        }
        other => {
            warn!(
                "Ignoring {} frame from agent of {}",
                other.kind(),
                tunnel.subdomain()
            );
        }
    }
}
