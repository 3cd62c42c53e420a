use crate::supervisor::PtySupervisor;
use consolle_core::WATCHDOG_POLL_MS;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Background liveness poller (spec.md section 4.5): every
/// `WATCHDOG_POLL_MS`, asks the supervisor whether its child is still
/// alive and respawns it if not, subject to the supervisor's own
/// restart-rate bookkeeping.
pub struct Watchdog {
    handle: JoinHandle<()>,
}

impl Watchdog {
    pub fn spawn(supervisor: Arc<PtySupervisor>) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(WATCHDOG_POLL_MS)).await;
                supervisor.watchdog_tick().await;
            }
        });
        Self { handle }
    }

    /// Kills the watchdog task (spec.md section 4.4.4, `stop` clears the
    /// running flag and kills the watchdog before tearing down the child).
    pub fn stop(self) {
        self.handle.abort();
    }
}
