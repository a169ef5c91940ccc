//! Public request router
//!
//! Every inbound HTTP request lands here. Requests for the bare relay host hit
//! the relay's own endpoints; anything else is proxied through the tunnel
//! named by the leftmost label of its Host header.

use axum::body::{Body, HttpBody};
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::StreamExt;
use http::header::HOST;
use http::request::Parts;
use http::{HeaderMap, StatusCode};
use porthole_common::constants::{REGISTRATION_PATH, REQUEST_CHUNK_SIZE};
use porthole_common::{
    RequestHead, RequestId, ResponseHead, headers_to_map, is_hop_by_hop, map_to_headers,
    split_chunks,
};
use std::io;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::AppState;
use crate::config::normalize_host;
use crate::correlation::{Listener, ListenerEvent};
use crate::error::RelayError;
use crate::session::handle_registration;
use crate::tunnel::{Outbound, Tunnel};

/// Body of the relay's landing page
pub const WELCOME_TEXT: &str = "welcome to porthole";

/// Fallback handler for every request the relay receives
pub async fn route(State(state): State<AppState>, req: Request) -> Response {
    let host = request_host(&req);

    if state.config.is_relay_host(&host) {
        return match req.uri().path() {
            "/" => WELCOME_TEXT.into_response(),
            "/health" => "OK".into_response(),
            REGISTRATION_PATH => handle_registration(state, req).await,
            _ => StatusCode::NOT_FOUND.into_response(),
        };
    }

    let subdomain = subdomain_of(&host);
    match state.registry.lookup(&subdomain).await {
        Ok(tunnel) => proxy(tunnel, req).await,
        Err(e) => e.into_response(),
    }
}

/// Host the caller addressed, from the Host header or an absolute URI
fn request_host(req: &Request) -> String {
    req.headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| req.uri().host())
        .unwrap_or_default()
        .to_string()
}

/// Leftmost label of a Host value, lowercased, without port
pub fn subdomain_of(host: &str) -> String {
    normalize_host(host)
        .split('.')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Forward one public request through `tunnel` and stream back the agent's answer
pub async fn proxy(tunnel: Arc<Tunnel>, req: Request) -> Response {
    let listener = tunnel.open_listener();
    let request_id = listener.id();

    let (parts, body) = req.into_parts();
    let request = request_head(&parts, &body);
    debug!(
        "{} {} {} via {}",
        request_id,
        request.method,
        request.path,
        tunnel.subdomain()
    );

    if let Err(e) = tunnel
        .send(Outbound::NewRequest {
            request_id,
            request,
        })
        .await
    {
        return e.into_response();
    }

    tokio::spawn(pump_body(tunnel, request_id, body));

    match respond(listener).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

fn request_head(parts: &Parts, body: &Body) -> RequestHead {
    RequestHead {
        method: parts.method.as_str().to_string(),
        path: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
        headers: headers_to_map(&parts.headers),
        host: parts
            .headers
            .get(HOST)
            .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
            .unwrap_or_default(),
        has_body: !body.is_end_stream(),
    }
}

/// Stream the public request body to the agent, always finishing with `BodyEnd`
async fn pump_body(tunnel: Arc<Tunnel>, request_id: RequestId, body: Body) {
    let mut stream = body.into_data_stream();

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => {
                for data in split_chunks(chunk, REQUEST_CHUNK_SIZE) {
                    if tunnel
                        .send(Outbound::BodyChunk { request_id, data })
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("Request {} body ended early: {}", request_id, e);
                break;
            }
        }
    }

    let _ = tunnel.send(Outbound::BodyEnd { request_id }).await;
}

/// Wait for the agent's response head, then stream its body
async fn respond(mut listener: Listener) -> Result<Response, RelayError> {
    loop {
        match listener.recv().await {
            Some(ListenerEvent::Response(head)) => return build_response(head, listener),
            Some(ListenerEvent::Data(_)) => {
                warn!(
                    "Request {} got body data before a response head, dropping it",
                    listener.id()
                );
            }
            Some(ListenerEvent::ProxyError(message)) => {
                warn!("Request {} proxy error: {}", listener.id(), message);
                listener.finish();
                return Err(RelayError::ProxyError);
            }
            None => return Err(RelayError::TunnelClosed),
        }
    }
}

fn build_response(head: ResponseHead, listener: Listener) -> Result<Response, RelayError> {
    let status =
        StatusCode::from_u16(head.status).map_err(|_| RelayError::InvalidStatus(head.status))?;

    let mut response = Response::new(Body::from_stream(body_stream(listener)));
    *response.status_mut() = status;
    copy_headers(&map_to_headers(&head.headers), response.headers_mut());
    Ok(response)
}

/// Copy end-to-end headers, keeping every value of repeated headers
fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from.iter() {
        if !is_hop_by_hop(name.as_str()) {
            to.append(name.clone(), value.clone());
        }
    }
}

/// Remaining listener events as a response body; a proxy error aborts it
fn body_stream(
    listener: Listener,
) -> impl futures_util::Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    futures_util::stream::unfold(Some(listener), |state| async move {
        let mut listener = state?;
        loop {
            match listener.recv().await {
                Some(ListenerEvent::Data(data)) => return Some((Ok(data), Some(listener))),
                Some(ListenerEvent::ProxyError(message)) => {
                    listener.finish();
                    return Some((Err(io::Error::other(message)), None));
                }
                Some(ListenerEvent::Response(_)) => {
                    warn!("Request {} got a second response head", listener.id());
                }
                None => return None,
            }
        }
    })
}
