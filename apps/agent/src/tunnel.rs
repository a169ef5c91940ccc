use crate::config::AgentConfig;
use crate::dispatcher::Dispatcher;
use crate::executor::Executor;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use porthole_common::constants::OUTBOUND_QUEUE_DEPTH;
use porthole_common::{Frame, Result, TunnelError, decode};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};

type WebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A registered tunnel: one WebSocket to the relay plus the tasks serving it.
///
/// Dropping the tunnel aborts its tasks, which closes the connection.
pub struct Tunnel {
    subdomain: String,
    public_url: String,
    write_handle: JoinHandle<TunnelError>,
    read_handle: JoinHandle<TunnelError>,
    heartbeat_handle: JoinHandle<TunnelError>,
}

impl Tunnel {
    /// Register with the relay and start serving forwarded requests
    pub async fn connect(config: &AgentConfig) -> Result<Self> {
        let (ws_stream, subdomain) = establish_connection(config).await?;
        let public_url = config.public_url(&subdomain);
        info!("Tunnel established: {}", public_url);

        let (write, read) = ws_stream.split();
        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);

        let executor = Executor::new(
            &config.local_address,
            config.request_timeout,
            outgoing_tx.clone(),
        )?;

        let write_handle = tokio::spawn(write_task(write, outgoing_rx));
        let read_handle = tokio::spawn(read_task(read, Dispatcher::new(executor)));
        let heartbeat_handle =
            tokio::spawn(heartbeat_task(outgoing_tx, config.heartbeat_interval));

        Ok(Self {
            subdomain,
            public_url,
            write_handle,
            read_handle,
            heartbeat_handle,
        })
    }

    pub fn subdomain(&self) -> &str {
        &self.subdomain
    }

    pub fn public_url(&self) -> &str {
        &self.public_url
    }

    /// Block until the tunnel terminates and return the reason
    pub async fn wait(mut self) -> TunnelError {
        let result = tokio::select! {
            result = &mut self.read_handle => result,
            result = &mut self.write_handle => result,
            result = &mut self.heartbeat_handle => result,
        };

        result.unwrap_or_else(|e| TunnelError::Connection(format!("Tunnel task failed: {}", e)))
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.read_handle.abort();
        self.write_handle.abort();
        self.heartbeat_handle.abort();
    }
}

/// Open the WebSocket and wait for the relay to assign a subdomain
async fn establish_connection(config: &AgentConfig) -> Result<(WebSocket, String)> {
    debug!("Connecting to {}", config.relay_url);

    let handshake = async {
        let (mut ws_stream, _) = connect_async(config.relay_url.as_str())
            .await
            .map_err(handshake_error)?;

        debug!("WebSocket connection established, waiting for subdomain");

        while let Some(message) = ws_stream.next().await {
            match message {
                Ok(WsMessage::Binary(bytes)) => match decode(&bytes)? {
                    Frame::Subdomain { subdomain } => return Ok((ws_stream, subdomain)),
                    Frame::Error { error } => return Err(TunnelError::Relay(error)),
                    other => warn!("Ignoring {} frame during handshake", other.kind()),
                },
                Ok(WsMessage::Close(_)) => {
                    return Err(TunnelError::Connection(
                        "Relay closed connection during handshake".to_string(),
                    ));
                }
                Err(e) => return Err(TunnelError::WebSocket(e.to_string())),
                _ => {}
            }
        }

        Err(TunnelError::Connection(
            "Connection closed before handshake".to_string(),
        ))
    };

    tokio::time::timeout(config.connect_timeout, handshake)
        .await
        .map_err(|_| TunnelError::Connection("Connection handshake timeout".to_string()))?
}

/// A non-101 upgrade response is the relay refusing the registration
fn handshake_error(error: WsError) -> TunnelError {
    match error {
        WsError::Http(response) => {
            let message = response
                .body()
                .as_ref()
                .map(|body| String::from_utf8_lossy(body).trim().to_string())
                .unwrap_or_default();

            TunnelError::Registration {
                status: response.status().as_u16(),
                message,
            }
        }
        other => TunnelError::Connection(other.to_string()),
    }
}

/// Sole owner of the sink; every outgoing frame passes through here
async fn write_task(
    mut write: SplitSink<WebSocket, WsMessage>,
    mut outgoing_rx: mpsc::Receiver<WsMessage>,
) -> TunnelError {
    while let Some(message) = outgoing_rx.recv().await {
        if let Err(e) = write.send(message).await {
            error!("Failed to send message: {}", e);
            return TunnelError::WebSocket(e.to_string());
        }
    }

    debug!("Write task exiting");
    TunnelError::Closed
}

async fn read_task(mut read: SplitStream<WebSocket>, mut dispatcher: Dispatcher) -> TunnelError {
    let reason = loop {
        let Some(message) = read.next().await else {
            break TunnelError::Closed;
        };

        match message {
            Ok(WsMessage::Binary(bytes)) => match decode(&bytes) {
                Ok(Frame::Error { error }) => {
                    error!("Relay reported error: {}", error);
                    break TunnelError::Relay(error);
                }
                Ok(frame) => dispatcher.dispatch(frame),
                Err(e) => {
                    error!("Failed to decode frame: {}", e);
                    break e;
                }
            },
            Ok(WsMessage::Text(_)) => {
                break TunnelError::Protocol("Unexpected text message".to_string());
            }
            Ok(WsMessage::Ping(_)) => debug!("Received WebSocket ping"),
            Ok(WsMessage::Pong(_)) => debug!("Received WebSocket pong"),
            Ok(WsMessage::Close(_)) => {
                info!("Relay closed connection");
                break TunnelError::Closed;
            }
            Ok(_) => {}
            Err(e) => {
                error!("WebSocket error: {}", e);
                break TunnelError::WebSocket(e.to_string());
            }
        }
    };

    debug!(
        "Read task exiting with {} requests in flight",
        dispatcher.in_flight()
    );
    reason
}

/// Transport-level keepalive for idle tunnels
async fn heartbeat_task(outgoing_tx: mpsc::Sender<WsMessage>, period: Duration) -> TunnelError {
    let mut interval = tokio::time::interval(period);
    interval.tick().await;

    loop {
        interval.tick().await;

        if outgoing_tx.send(WsMessage::Ping(Vec::new().into())).await.is_err() {
            debug!("Heartbeat task exiting");
            return TunnelError::Closed;
        }
    }
}
