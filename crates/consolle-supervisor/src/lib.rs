//! Supervises one interactive console child over a PTY (spec.md section
//! 4.4), or evaluates against the in-process embedded backend (spec.md
//! section 4.9), behind a common `Backend` trait the broker dispatches
//! against without caring which is in play.

mod backend;
mod embedded;
mod env_scrub;
mod error;
mod injection;
mod output_parser;
mod restart_ledger;
mod supervisor;
mod watchdog;

pub use backend::{Backend, BackendStatus, EvalSuccess};
pub use embedded::EmbeddedBackend;
pub use error::EvalError;
pub use supervisor::PtySupervisor;
pub use watchdog::Watchdog;
