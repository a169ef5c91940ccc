use crate::executor::Executor;
use bytes::Bytes;
use porthole_common::{Frame, RequestId};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Routes relay frames to in-flight requests.
///
/// Owned by the read task, so the pipe table needs no locking. Each pipe
/// carries request body chunks to the executor handling that id; dropping
/// the sender ends the body. Pipes are unbounded so a local service that is
/// slow to take a body never holds up frames for other requests.
pub struct Dispatcher {
    pipes: HashMap<RequestId, mpsc::UnboundedSender<Bytes>>,
    executor: Executor,
}

impl Dispatcher {
    pub fn new(executor: Executor) -> Self {
        Self {
            pipes: HashMap::new(),
            executor,
        }
    }

    pub fn dispatch(&mut self, frame: Frame) {
        match frame {
            Frame::Request {
                request_id,
                request,
            } => {
                let (body_tx, body_rx) = mpsc::unbounded_channel();
                if self.pipes.insert(request_id, body_tx).is_some() {
                    warn!("Request id {} reused while still in flight", request_id);
                }

                let executor = self.executor.clone();
                tokio::spawn(async move {
                    executor.execute(request_id, request, body_rx).await;
                });
            }
            Frame::Data { request_id, data } => {
                let Some(pipe) = self.pipes.get(&request_id) else {
                    debug!("Dropping data for unknown request {}", request_id);
                    return;
                };

                if pipe.send(data).is_err() {
                    // executor finished or never wanted a body
                    self.pipes.remove(&request_id);
                }
            }
            Frame::Close { request_id } => {
                self.pipes.remove(&request_id);
            }
            other => {
                warn!("Ignoring unexpected {} frame from relay", other.kind());
            }
        }
    }

    /// Number of requests whose body is still open
    pub fn in_flight(&self) -> usize {
        self.pipes.len()
    }
}
