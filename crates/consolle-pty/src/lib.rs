//! PTY Child abstraction (spec.md section 4.3): launch a command attached
//! to a pseudo-terminal such that the daemon can write to the child's
//! stdin and read its stdout/stderr through a single master handle.
//!
//! Only implemented for Unix; the PTY backend compiles out entirely on
//! other targets, matching the teacher crate's own `#[cfg(unix)]` gating
//! of its PTY code.

#[cfg(unix)]
mod child;
mod error;

#[cfg(unix)]
pub use child::{PtyChild, ReadEvent};
pub use error::PtyError;
