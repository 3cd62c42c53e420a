use crate::error::PtyError;
use nix::pty::{Winsize, openpty};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::{Pid, dup, setsid};
use std::ffi::c_void;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use tokio::io::unix::AsyncFd;

/// Result of a single non-blocking read attempt against the PTY master.
#[derive(Debug)]
pub enum ReadEvent {
    /// Bytes were available.
    Data(Vec<u8>),
    /// The child closed its end; no further data will arrive.
    Eof,
}

/// A child process attached to a pseudo-terminal pair. The master fd lives
/// in the daemon and is non-blocking; the slave becomes the child's
/// controlling terminal.
pub struct PtyChild {
    child: std::process::Child,
    master: AsyncFd<OwnedFd>,
}

impl PtyChild {
    /// Spawn `launch_command` (run through `/bin/sh -c`) attached to a
    /// freshly allocated pty, with the given working directory, terminal
    /// geometry, and environment overrides layered on top of the daemon's
    /// own environment.
    pub fn spawn(
        launch_command: &str,
        cwd: &Path,
        rows: u16,
        cols: u16,
        env_overrides: &[(String, String)],
    ) -> Result<Self, PtyError> {
        let pty = openpty(
            Some(&Winsize {
                ws_row: rows,
                ws_col: cols,
                ws_xpixel: 0,
                ws_ypixel: 0,
            }),
            None,
        )
        .map_err(|e| PtyError::Allocate(io::Error::from(e)))?;

        let slave_fd_raw = pty.slave.as_raw_fd();
        let stdin_fd = dup(slave_fd_raw).map_err(|e| PtyError::Spawn(io::Error::from(e)))?;
        let stdout_fd = dup(slave_fd_raw).map_err(|e| PtyError::Spawn(io::Error::from(e)))?;
        let stderr_fd = dup(slave_fd_raw).map_err(|e| PtyError::Spawn(io::Error::from(e)))?;

        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c")
            .arg(launch_command)
            .current_dir(cwd)
            .stdin(Stdio::from(owned_file(stdin_fd)))
            .stdout(Stdio::from(owned_file(stdout_fd)))
            .stderr(Stdio::from(owned_file(stderr_fd)));

        for (key, value) in env_overrides {
            cmd.env(key, value);
        }

        // SAFETY: `pre_exec` runs in the child after fork and before exec.
        // `setsid` and `ioctl(TIOCSCTTY)` are async-signal-safe and touch
        // only the freshly forked process's own terminal association.
        unsafe {
            cmd.pre_exec(move || {
                setsid().map_err(|e| io::Error::from_raw_os_error(e as i32))?;
                let rc = libc::ioctl(slave_fd_raw, libc::TIOCSCTTY as _, 0);
                if rc == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = cmd.spawn().map_err(PtyError::Spawn)?;

        // Parent no longer needs the slave side; the child holds its own
        // dup'd copies.
        drop(pty.slave);

        set_nonblocking(&pty.master).map_err(PtyError::Allocate)?;
        let master = AsyncFd::new(pty.master).map_err(PtyError::Allocate)?;

        Ok(Self { child, master })
    }

    /// OS pid of the child, if still tracked.
    pub fn pid(&self) -> i32 {
        self.child.id() as i32
    }

    /// Non-blocking check of whether the child has exited, without
    /// reaping more than once (spec.md section 4.4.4, `waitpid(WNOHANG)`).
    pub fn try_wait(&mut self) -> io::Result<Option<std::process::ExitStatus>> {
        self.child.try_wait()
    }

    /// Blocking wait for exit (used after a signal has been sent).
    pub fn wait(&mut self) -> io::Result<std::process::ExitStatus> {
        self.child.wait()
    }

    /// Send a signal to the child's whole process group (the child called
    /// `setsid`, so its pgid equals its pid).
    pub fn signal_group(&self, signal: Signal) {
        let _ = killpg(Pid::from_raw(self.pid()), signal);
    }

    /// Attempt a single non-blocking read from the PTY master. Waits for
    /// the fd to become readable, then performs exactly one `read(2)`.
    /// Returns `ReadEvent::Eof` on a zero-byte read (child closed its tty).
    pub async fn read_chunk(&self, max_len: usize) -> io::Result<ReadEvent> {
        loop {
            let mut guard = self.master.readable().await?;
            let mut buf = vec![0u8; max_len];
            let result = guard.try_io(|inner| raw_read(inner.as_raw_fd(), &mut buf));
            match result {
                Ok(Ok(0)) => return Ok(ReadEvent::Eof),
                Ok(Ok(n)) => {
                    buf.truncate(n);
                    return Ok(ReadEvent::Data(buf));
                }
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
    }

    /// Write the full buffer to the PTY master, handling partial writes
    /// and `EAGAIN` by waiting for writability again.
    pub async fn write_all(&self, data: &[u8]) -> io::Result<()> {
        let mut offset = 0;
        while offset < data.len() {
            let mut guard = self.master.writable().await?;
            let remaining = &data[offset..];
            let result = guard.try_io(|inner| raw_write(inner.as_raw_fd(), remaining));
            match result {
                Ok(Ok(n)) => offset += n,
                Ok(Err(e)) => return Err(e),
                Err(_would_block) => continue,
            }
        }
        Ok(())
    }
}

fn owned_file(fd: std::os::unix::io::RawFd) -> std::fs::File {
    // SAFETY: `fd` is a valid descriptor from a successful `dup(2)` call
    // and is not used elsewhere; the returned `File` uniquely owns it.
    unsafe { std::fs::File::from_raw_fd(fd) }
}

fn set_nonblocking(fd: &OwnedFd) -> io::Result<()> {
    let raw = fd.as_raw_fd();
    // SAFETY: `raw` is a valid fd owned by `fd` for the duration of this call.
    let flags = unsafe { libc::fcntl(raw, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: see above; we only modify the O_NONBLOCK bit.
    let rc = unsafe { libc::fcntl(raw, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn raw_read(fd: std::os::unix::io::RawFd, buf: &mut [u8]) -> io::Result<usize> {
    // SAFETY: `fd` is valid for the duration of the call and `buf` has
    // `buf.len()` writable bytes.
    let n = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

fn raw_write(fd: std::os::unix::io::RawFd, buf: &[u8]) -> io::Result<usize> {
    // SAFETY: `fd` is valid for the duration of the call and `buf` has
    // `buf.len()` readable bytes.
    let n = unsafe { libc::write(fd, buf.as_ptr() as *const c_void, buf.len()) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}
