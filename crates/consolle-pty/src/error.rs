#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    #[error("failed to allocate pty: {0}")]
    Allocate(#[source] std::io::Error),
    #[error("failed to spawn child: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("pty io error: {0}")]
    Io(#[source] std::io::Error),
    #[error("pty child is not running")]
    NotRunning,
}
