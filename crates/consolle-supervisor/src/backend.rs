use crate::error::EvalError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// What output an eval produced, before it's translated into wire fields.
#[derive(Debug, Clone)]
pub struct EvalSuccess {
    pub output: String,
    pub execution_time: Duration,
    pub truncated: bool,
}

/// Point-in-time status of a backend (spec.md section 6, `status` action).
#[derive(Debug, Clone)]
pub struct BackendStatus {
    pub running: bool,
    pub pid: Option<u32>,
    pub rails_root: PathBuf,
    pub rails_env: String,
}

/// Unifies the PTY-backed supervisor and the in-process embedded backend
/// behind one interface, so the broker doesn't need to know which is in
/// play (spec.md section 9 design note, supplemented in section 4.9).
#[async_trait]
pub trait Backend: Send + Sync {
    async fn eval(&self, code: &str, timeout: Option<Duration>) -> Result<EvalSuccess, EvalError>;
    async fn status(&self) -> BackendStatus;
    async fn restart(&self) -> Result<BackendStatus, EvalError>;
    async fn stop(&self);
}
