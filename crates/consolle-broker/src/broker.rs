use crate::dispatch::dispatch;
use crate::queue::QueueItem;
use consolle_core::{DEFAULT_EVAL_TIMEOUT_SECS, ErrorCode, RequestEnvelope, ResponseEnvelope, generate_request_id};
use consolle_supervisor::Backend;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

/// Extra slack the broker waits beyond the caller's own eval timeout, so
/// the supervisor's internal `EXECUTION_TIMEOUT` handling gets a chance to
/// resolve the future before the broker's own `REQUEST_TIMEOUT` does.
const REQUEST_TIMEOUT_EPSILON: Duration = Duration::from_secs(2);

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<ResponseEnvelope>>>>;

/// Serializes all access to one `Backend` through a single worker task
/// (spec.md section 4.6), so the socket server's concurrent connections
/// never race each other over the PTY.
pub struct RequestBroker {
    tx: mpsc::UnboundedSender<QueueItem>,
    pending: PendingMap,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl RequestBroker {
    pub fn start(backend: Arc<dyn Backend>) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        let worker = tokio::spawn(run_worker(backend, rx, pending.clone()));

        Arc::new(Self {
            tx,
            pending,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Enqueues `envelope` and blocks until either a response arrives or
    /// the caller's timeout (plus epsilon) expires.
    pub async fn process_request(&self, mut envelope: RequestEnvelope) -> ResponseEnvelope {
        let request_id = envelope
            .request_id
            .clone()
            .unwrap_or_else(generate_request_id);
        envelope.request_id = Some(request_id.clone());

        let wait_budget = envelope
            .timeout
            .map(Duration::from_secs_f64)
            .unwrap_or(Duration::from_secs(DEFAULT_EVAL_TIMEOUT_SECS))
            + REQUEST_TIMEOUT_EPSILON;

        let (response_tx, response_rx) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(request_id.clone(), response_tx);

        if self
            .tx
            .send(QueueItem::Request {
                request_id: request_id.clone(),
                envelope,
                enqueued_at: Instant::now(),
            })
            .is_err()
        {
            self.pending.lock().await.remove(&request_id);
            return ResponseEnvelope::failure(
                request_id,
                ErrorCode::UnknownError,
                "broker worker is not running",
            );
        }

        match tokio::time::timeout(wait_budget, response_rx).await {
            Ok(Ok(response)) => response,
            _ => {
                self.pending.lock().await.remove(&request_id);
                ResponseEnvelope::failure(
                    request_id,
                    ErrorCode::RequestTimeout,
                    "request timed out waiting for the broker",
                )
            }
        }
    }

    /// Sends the poison pill and joins the worker task.
    pub async fn stop(&self) {
        let _ = self.tx.send(QueueItem::Shutdown);
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
    }
}

async fn run_worker(
    backend: Arc<dyn Backend>,
    mut rx: mpsc::UnboundedReceiver<QueueItem>,
    pending: PendingMap,
) {
    while let Some(item) = rx.recv().await {
        match item {
            QueueItem::Shutdown => break,
            QueueItem::Request {
                request_id,
                envelope,
                ..
            } => {
                let response = dispatch(&backend, request_id.clone(), envelope).await;
                if let Some(sender) = pending.lock().await.remove(&request_id) {
                    let _ = sender.send(response);
                }
            }
        }
    }
}
