use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use consolle_broker::RequestBroker;
use consolle_core::{ErrorCode, RequestEnvelope, ResponseEnvelope, generate_request_id};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;

use crate::socket::{bind_listener, cleanup_socket_file};

/// Accepts Unix-socket clients and hands each request line to a
/// [`RequestBroker`] (spec.md section 4.7). One connection serves exactly
/// one request/response round trip, matching the wire protocol's
/// line-delimited, connect-per-call shape.
pub struct SocketServer {
    listener: UnixListener,
    socket_path: PathBuf,
    broker: Arc<RequestBroker>,
}

impl SocketServer {
    pub async fn bind(socket_path: impl Into<PathBuf>, broker: Arc<RequestBroker>) -> io::Result<Self> {
        let socket_path = socket_path.into();
        let listener = bind_listener(&socket_path).await?;
        Ok(Self {
            listener,
            socket_path,
            broker,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Runs the accept loop until `shutdown` is signalled true, e.g. by a
    /// SIGINT/SIGTERM handler or an explicit `restart`/`stop` request
    /// (spec.md section 4.7: "Installs SIGINT/SIGTERM handlers that clear
    /// the running flag and exit").
    pub async fn serve(self, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                accept_result = self.listener.accept() => {
                    let (stream, _addr) = accept_result?;
                    let broker = self.broker.clone();
                    tokio::spawn(async move {
                        if let Err(error) = handle_connection(stream, broker).await {
                            tracing::debug!(%error, "consolle client connection ended with an error");
                        }
                    });
                }
            }
        }

        cleanup_socket_file(&self.socket_path).await?;
        Ok(())
    }
}

/// Installs OS signal handlers that flip `shutdown` to `true` on
/// SIGINT/SIGTERM.
pub fn install_shutdown_signals(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };
        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }

        let _ = shutdown.send(true);
    });
}

async fn handle_connection(stream: UnixStream, broker: Arc<RequestBroker>) -> io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 || line.trim().is_empty() {
        return Ok(());
    }

    let response = match serde_json::from_str::<RequestEnvelope>(line.trim()) {
        Ok(envelope) => broker.process_request(envelope).await,
        Err(error) => ResponseEnvelope::failure(
            generate_request_id(),
            ErrorCode::MissingParameter,
            format!("invalid request: {error}"),
        ),
    };

    write_response(&mut write_half, &response).await
}

async fn write_response(
    writer: &mut (impl AsyncWriteExt + Unpin),
    response: &ResponseEnvelope,
) -> io::Result<()> {
    let payload = serde_json::to_string(response)
        .unwrap_or_else(|_| "{\"success\":false,\"request_id\":\"\"}".to_string());

    // A client that disconnects mid-write (EPIPE/BrokenPipe) is dropped
    // silently: no retry, matching spec.md section 7's Infrastructure row.
    match writer.write_all(payload.as_bytes()).await {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => return Ok(()),
        Err(error) => return Err(error),
    }
    if let Err(error) = writer.write_all(b"\n").await {
        if error.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(error);
    }
    match writer.flush().await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(()),
        Err(error) => Err(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use consolle_core::Action;
    use consolle_supervisor::{Backend, BackendStatus, EvalError, EvalSuccess};
    use std::path::PathBuf as StdPathBuf;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt as _;

    struct EchoBackend;

    #[async_trait]
    impl Backend for EchoBackend {
        async fn eval(&self, code: &str, _timeout: Option<Duration>) -> Result<EvalSuccess, EvalError> {
            Ok(EvalSuccess {
                output: format!("=> {code}"),
                execution_time: Duration::from_millis(1),
                truncated: false,
            })
        }

        async fn status(&self) -> BackendStatus {
            BackendStatus {
                running: true,
                pid: Some(42),
                rails_root: StdPathBuf::from("/tmp/app"),
                rails_env: "test".to_string(),
            }
        }

        async fn restart(&self) -> Result<BackendStatus, EvalError> {
            Ok(self.status().await)
        }

        async fn stop(&self) {}
    }

    #[tokio::test]
    async fn serves_one_eval_request_per_connection() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("daemon.sock");
        let broker = RequestBroker::start(Arc::new(EchoBackend));
        let server = SocketServer::bind(&socket_path, broker.clone()).await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let serve_handle = tokio::spawn(server.serve(shutdown_rx));

        let mut client = crate::socket::connect(&socket_path).await.unwrap();
        client
            .write_all(b"{\"action\":\"eval\",\"code\":\"1 + 1\",\"request_id\":\"r1\"}\n")
            .await
            .unwrap();

        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let response: ResponseEnvelope = serde_json::from_str(line.trim()).unwrap();
        assert!(response.success);
        assert_eq!(response.result.as_deref(), Some("=> 1 + 1"));
        assert_eq!(response.request_id, "r1");

        let _ = shutdown_tx.send(true);
        serve_handle.await.unwrap().unwrap();
        broker.stop().await;
    }

    #[tokio::test]
    async fn malformed_json_gets_a_failure_response_not_a_dropped_connection() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("daemon.sock");
        let broker = RequestBroker::start(Arc::new(EchoBackend));
        let server = SocketServer::bind(&socket_path, broker.clone()).await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let serve_handle = tokio::spawn(server.serve(shutdown_rx));

        let mut client = crate::socket::connect(&socket_path).await.unwrap();
        client.write_all(b"not json\n").await.unwrap();

        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let response: ResponseEnvelope = serde_json::from_str(line.trim()).unwrap();
        assert!(!response.success);
        assert_eq!(response.error, Some(ErrorCode::MissingParameter));

        let _ = shutdown_tx.send(true);
        serve_handle.await.unwrap().unwrap();
        broker.stop().await;
    }

    #[tokio::test]
    async fn status_action_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("daemon.sock");
        let broker = RequestBroker::start(Arc::new(EchoBackend));
        let server = SocketServer::bind(&socket_path, broker.clone()).await.unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let serve_handle = tokio::spawn(server.serve(shutdown_rx));

        let mut client = crate::socket::connect(&socket_path).await.unwrap();
        client
            .write_all(b"{\"action\":\"status\"}\n")
            .await
            .unwrap();
        let mut reader = BufReader::new(client);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        let response: ResponseEnvelope = serde_json::from_str(line.trim()).unwrap();
        assert!(response.success);
        assert_eq!(response.pid, Some(42));

        let _ = shutdown_tx.send(true);
        serve_handle.await.unwrap().unwrap();
        broker.stop().await;
        let _ = Action::Status;
    }
}
