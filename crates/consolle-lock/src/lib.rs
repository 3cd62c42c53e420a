//! Advisory file locking for the daemon: one `flock`-guarded lock per
//! supervised target (so two daemons can never attach to the same
//! project), and a small JSON-backed registry recording which socket/pid
//! currently serves each target (spec.md supplemented section 4.8).

mod error;
mod registry;
mod target_lock;

pub use error::LockError;
pub use registry::{JsonFileRegistry, TargetEntry, TargetRegistry};
pub use target_lock::{TargetLock, acquire_target_lock};
