#[cfg(not(unix))]
compile_error!("consolle-socket requires Unix domain sockets");

use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tokio::net::{UnixListener, UnixStream};

/// Binds the listening socket at `socket_path`, removing a stale socket
/// file left behind by a crashed daemon first, and tightens permissions to
/// `0600` (spec.md section 6, "Filesystem layout").
pub async fn bind_listener(socket_path: &Path) -> io::Result<UnixListener> {
    if let Some(parent) = socket_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    if socket_path.exists() {
        tokio::fs::remove_file(socket_path).await?;
    }

    let listener = UnixListener::bind(socket_path)?;
    let perms = std::fs::Permissions::from_mode(0o600);
    tokio::fs::set_permissions(socket_path, perms).await?;
    Ok(listener)
}

pub async fn connect(socket_path: &Path) -> io::Result<UnixStream> {
    UnixStream::connect(socket_path).await
}

pub async fn cleanup_socket_file(socket_path: &Path) -> io::Result<()> {
    if socket_path.exists() {
        tokio::fs::remove_file(socket_path).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn bind_sets_owner_only_permissions() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("nested").join("daemon.sock");
        let _listener = bind_listener(&socket_path).await.expect("bind");

        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn removes_stale_socket_before_binding() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("daemon.sock");
        std::fs::write(&socket_path, b"not a socket").unwrap();

        let listener = bind_listener(&socket_path).await.expect("bind over stale file");
        drop(listener);
    }

    #[tokio::test]
    async fn round_trips_one_line() {
        let dir = tempfile::tempdir().unwrap();
        let socket_path = dir.path().join("daemon.sock");
        let listener = bind_listener(&socket_path).await.unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            reader.read_line(&mut line).await.unwrap();
            write_half.write_all(b"{\"ok\":true}\n").await.unwrap();
        });

        let mut client = connect(&socket_path).await.unwrap();
        client.write_all(b"ping\n").await.unwrap();
        let mut response = String::new();
        let mut client_reader = BufReader::new(client);
        client_reader.read_line(&mut response).await.unwrap();
        server.await.unwrap();

        assert_eq!(response.trim(), "{\"ok\":true}");
        cleanup_socket_file(&socket_path).await.unwrap();
        assert!(!socket_path.exists());
    }
}
