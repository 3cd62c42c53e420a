//! Shared types for the consolle daemon: wire protocol envelopes, the
//! error-code taxonomy, and session configuration.

pub mod config;
pub mod error_code;
pub mod protocol;

pub use config::{BackendKind, SessionConfig};
pub use error_code::ErrorCode;
pub use protocol::{Action, EvalOutcome, RequestEnvelope, ResponseEnvelope};

/// Default per-call evaluation timeout, seconds (spec.md section 4.4.2).
pub const DEFAULT_EVAL_TIMEOUT_SECS: u64 = 60;
/// Budget for observing the child's first prompt after spawn.
pub const DEFAULT_INITIAL_WAIT_SECS: u64 = 15;
/// Restart bookkeeping window (spec.md section 4.4.1 / 5).
pub const RESTART_WINDOW_SECS: u64 = 300;
/// Max restarts allowed inside `RESTART_WINDOW_SECS` before a warning.
pub const MAX_RESTARTS: usize = 5;
/// Minimum delay between consecutive watchdog-driven spawns.
pub const RESTART_DELAY_MS: u64 = 1_000;
/// Watchdog poll interval.
pub const WATCHDOG_POLL_MS: u64 = 500;
/// Pre-exec health check budget.
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 3;
/// Threshold, in UTF-8 bytes, above which code is injected via a temp file
/// instead of an inline base64 literal (spec.md section 4.4.2 step 2).
pub const INLINE_INJECTION_LIMIT_BYTES: usize = 1000;
/// Output is truncated past this many bytes (spec.md section 4.4.2 step 5).
pub const MAX_OUTPUT_BYTES: usize = 100 * 1024;

/// Generate a fresh request id when the caller did not supply one.
pub fn generate_request_id() -> String {
    ulid::Ulid::new().to_string()
}
