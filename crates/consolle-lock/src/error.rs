#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("failed to create lock directory {path}: {source}")]
    CreateDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open lock file {path}: {source}")]
    Open {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("target is already locked by another daemon (pid {held_by_pid})")]
    AlreadyLocked { held_by_pid: u32 },
    #[error("failed to read lock diagnostic: {0}")]
    DiagnosticUnreadable(#[source] std::io::Error),
    #[error("failed to write lock diagnostic: {0}")]
    DiagnosticWrite(#[source] std::io::Error),
    #[error("failed to serialize lock diagnostic: {0}")]
    Serialize(#[source] serde_json::Error),
}
