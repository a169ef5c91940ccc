use bytes::Bytes;
use futures_util::StreamExt;
use porthole_common::constants::RESPONSE_CHUNK_SIZE;
use porthole_common::{
    Frame, RequestHead, RequestId, ResponseHead, Result, TunnelError, encode, headers_to_map,
    is_hop_by_hop, map_to_headers, split_chunks,
};
use reqwest::header::{HOST, HeaderMap, HeaderValue};
use reqwest::{Body, Client, Method};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// Performs forwarded requests against the local service and streams the
/// results back as frames.
#[derive(Clone)]
pub struct Executor {
    client: Client,
    local_address: Arc<str>,
    outgoing: mpsc::Sender<WsMessage>,
}

impl Executor {
    pub fn new(
        local_address: &str,
        timeout: Duration,
        outgoing: mpsc::Sender<WsMessage>,
    ) -> Result<Self> {
        // Redirects go back to the public client untouched
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| TunnelError::Connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            local_address: Arc::from(local_address.trim_end_matches('/')),
            outgoing,
        })
    }

    /// Serve one forwarded request.
    ///
    /// Emits a response head, the body as data frames and a close, or a
    /// single proxy error if the local call fails before or during the body.
    pub async fn execute(
        &self,
        request_id: RequestId,
        request: RequestHead,
        body: mpsc::UnboundedReceiver<Bytes>,
    ) {
        let started = Instant::now();

        let response = match self.forward(&request, body).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    "{} --> {} {} --> Proxy error: {}",
                    request_id, request.method, request.path, e
                );
                self.emit(Frame::ProxyError {
                    request_id,
                    message: e.to_string(),
                })
                .await;
                return;
            }
        };

        info!(
            "{} --> {} {} --> {}",
            request_id,
            request.method,
            request.path,
            response.status().as_u16()
        );

        let head = ResponseHead {
            status: response.status().as_u16(),
            headers: headers_to_map(response.headers()),
        };
        if !self
            .emit(Frame::Response {
                request_id,
                response: head,
            })
            .await
        {
            return;
        }

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    warn!("{} --> Response body failed: {}", request_id, e);
                    self.emit(Frame::ProxyError {
                        request_id,
                        message: e.to_string(),
                    })
                    .await;
                    return;
                }
            };

            for data in split_chunks(chunk, RESPONSE_CHUNK_SIZE) {
                if !self.emit(Frame::Data { request_id, data }).await {
                    return;
                }
            }
        }

        self.emit(Frame::Close { request_id }).await;
        debug!("{} completed in {:?}", request_id, started.elapsed());
    }

    async fn forward(
        &self,
        request: &RequestHead,
        body: mpsc::UnboundedReceiver<Bytes>,
    ) -> Result<reqwest::Response> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TunnelError::Protocol(format!("Invalid method: {}", request.method)))?;
        let url = format!("{}{}", self.local_address, request.path);

        let mut headers = HeaderMap::new();
        for (name, value) in map_to_headers(&request.headers).iter() {
            if is_hop_by_hop(name.as_str()) || *name == HOST {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        if !request.host.is_empty() {
            if let Ok(host) = HeaderValue::from_str(&request.host) {
                headers.insert(HOST, host);
            }
        }

        let mut builder = self.client.request(method, &url).headers(headers);
        if request.has_body {
            builder = builder.body(Body::wrap_stream(body_stream(body)));
        }

        builder
            .send()
            .await
            .map_err(|e| TunnelError::LocalService(e.to_string()))
    }

    /// Queue a frame for the writer; false once the tunnel is gone
    async fn emit(&self, frame: Frame) -> bool {
        let bytes = match encode(&frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to encode {} frame: {}", frame.kind(), e);
                return false;
            }
        };

        self.outgoing
            .send(WsMessage::Binary(bytes.into()))
            .await
            .is_ok()
    }
}

fn body_stream(
    mut body: mpsc::UnboundedReceiver<Bytes>,
) -> impl futures_util::Stream<Item = io::Result<Bytes>> + Send + Sync + 'static {
    futures_util::stream::poll_fn(move |cx| body.poll_recv(cx).map(|chunk| chunk.map(Ok)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Bytes as AxumBytes;
    use axum::http::HeaderMap as AxumHeaderMap;
    use axum::routing::{get, post};
    use porthole_common::decode;
    use tokio::net::TcpListener;

    async fn spawn_local(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn next_frame(rx: &mut mpsc::Receiver<WsMessage>) -> Frame {
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match message {
            WsMessage::Binary(bytes) => decode(&bytes).unwrap(),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_execute_streams_head_body_close() {
        let app = Router::new().route(
            "/hello",
            get(|headers: AxumHeaderMap| async move {
                let host = headers
                    .get("host")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                (
                    axum::response::AppendHeaders([("x-test", "1"), ("x-test", "2")]),
                    format!("hello {}", host),
                )
            }),
        );
        let local = spawn_local(app).await;

        let (tx, mut rx) = mpsc::channel(16);
        let executor = Executor::new(&local, Duration::from_secs(5), tx).unwrap();
        let (_body_tx, body_rx) = mpsc::unbounded_channel();

        executor
            .execute(
                1,
                RequestHead::new("GET", "/hello", "abcde.example.com"),
                body_rx,
            )
            .await;

        let Frame::Response {
            request_id,
            response,
        } = next_frame(&mut rx).await
        else {
            panic!("expected response head");
        };
        assert_eq!(request_id, 1);
        assert_eq!(response.status, 200);
        assert_eq!(
            response.headers.get("x-test"),
            Some(&vec!["1".to_string(), "2".to_string()])
        );

        let mut body = Vec::new();
        loop {
            match next_frame(&mut rx).await {
                Frame::Data { data, .. } => body.extend_from_slice(&data),
                Frame::Close { request_id } => {
                    assert_eq!(request_id, 1);
                    break;
                }
                other => panic!("unexpected frame: {:?}", other),
            }
        }
        assert_eq!(body, b"hello abcde.example.com");
    }

    #[tokio::test]
    async fn test_execute_streams_request_body() {
        let app = Router::new().route("/echo", post(|body: AxumBytes| async move { body }));
        let local = spawn_local(app).await;

        let (tx, mut rx) = mpsc::channel(16);
        let executor = Executor::new(&local, Duration::from_secs(5), tx).unwrap();
        let (body_tx, body_rx) = mpsc::unbounded_channel();

        let mut head = RequestHead::new("POST", "/echo", "abcde.example.com");
        head.has_body = true;
        let task = tokio::spawn(async move { executor.execute(2, head, body_rx).await });

        for part in ["one ", "two ", "three"] {
            body_tx.send(Bytes::from(part)).unwrap();
        }
        drop(body_tx);
        task.await.unwrap();

        let Frame::Response { response, .. } = next_frame(&mut rx).await else {
            panic!("expected response head");
        };
        assert_eq!(response.status, 200);

        let mut body = Vec::new();
        while let Frame::Data { data, .. } = next_frame(&mut rx).await {
            body.extend_from_slice(&data);
        }
        assert_eq!(body, b"one two three");
    }

    #[tokio::test]
    async fn test_redirects_are_not_followed() {
        let app = Router::new().route(
            "/old",
            get(|| async { axum::response::Redirect::temporary("/new") }),
        );
        let local = spawn_local(app).await;

        let (tx, mut rx) = mpsc::channel(16);
        let executor = Executor::new(&local, Duration::from_secs(5), tx).unwrap();
        let (_body_tx, body_rx) = mpsc::unbounded_channel();

        executor
            .execute(3, RequestHead::new("GET", "/old", ""), body_rx)
            .await;

        let Frame::Response { response, .. } = next_frame(&mut rx).await else {
            panic!("expected response head");
        };
        assert_eq!(response.status, 307);
        assert_eq!(
            response.headers.get("location"),
            Some(&vec!["/new".to_string()])
        );
    }

    #[tokio::test]
    async fn test_invalid_method_reports_proxy_error() {
        let (tx, mut rx) = mpsc::channel(16);
        let executor =
            Executor::new("http://127.0.0.1:9", Duration::from_secs(5), tx).unwrap();
        let (_body_tx, body_rx) = mpsc::unbounded_channel();

        executor
            .execute(4, RequestHead::new("BAD METHOD", "/", ""), body_rx)
            .await;

        assert!(matches!(
            next_frame(&mut rx).await,
            Frame::ProxyError { request_id: 4, .. }
        ));
    }
}
