use consolle_core::{MAX_RESTARTS, RESTART_WINDOW_SECS};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Bounded sequence of recent restart timestamps (spec.md invariant 3):
/// entries older than `RESTART_WINDOW_SECS` are dropped on every push, and
/// a warning is logged (not enforced as a hard cap) once more than
/// `MAX_RESTARTS` remain in the window.
#[derive(Debug, Default)]
pub struct RestartLedger {
    timestamps: VecDeque<Instant>,
}

impl RestartLedger {
    pub fn new() -> Self {
        Self {
            timestamps: VecDeque::new(),
        }
    }

    /// Records a restart at `now`, evicts stale entries, and reports
    /// whether the window is now over `MAX_RESTARTS`.
    pub fn record(&mut self, now: Instant) -> bool {
        self.timestamps.push_back(now);
        let window = Duration::from_secs(RESTART_WINDOW_SECS);
        while let Some(&oldest) = self.timestamps.front() {
            if now.duration_since(oldest) > window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        self.timestamps.len() > MAX_RESTARTS
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_entries_outside_window() {
        let mut ledger = RestartLedger::new();
        let t0 = Instant::now();
        ledger.record(t0);
        let later = t0 + Duration::from_secs(RESTART_WINDOW_SECS + 1);
        ledger.record(later);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn warns_past_max_restarts() {
        let mut ledger = RestartLedger::new();
        let now = Instant::now();
        let mut exceeded = false;
        for i in 0..=MAX_RESTARTS {
            exceeded = ledger.record(now + Duration::from_millis(i as u64));
        }
        assert!(exceeded);
    }
}
