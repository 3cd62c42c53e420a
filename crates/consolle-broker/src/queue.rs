use consolle_core::RequestEnvelope;
use std::time::Instant;

/// One item on the broker's FIFO queue (spec.md section 4.6). `Shutdown`
/// is the poison pill that wakes the worker so it can exit on `stop`.
pub(crate) enum QueueItem {
    Request {
        request_id: String,
        envelope: RequestEnvelope,
        #[allow(dead_code)]
        enqueued_at: Instant,
    },
    Shutdown,
}
