//! Self-managed hosting: pid-lock guard, fork/detach, and the blocking
//! run loop around the compile server.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use thiserror::Error;

use crate::server::Server;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("another instance is already running (pid {pid})")]
    AlreadyRunning { pid: i32 },

    #[error("fork failed: {0}")]
    Fork(io::Error),

    #[error("daemon has no server attached")]
    NoServer,

    #[error("compile server failed: {0}")]
    Server(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Exclusive pid-file lock preventing duplicate daemon instances on one
/// host. A lock whose recorded pid is dead is stale and taken over.
pub struct PidLock {
    path: PathBuf,
    held: bool,
}

impl PidLock {
    pub fn new(path: PathBuf) -> Self {
        Self { path, held: false }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn acquire(&mut self) -> Result<(), DaemonError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        if let Some(pid) = self.read_pid() {
            if process_alive(pid) {
                return Err(DaemonError::AlreadyRunning { pid });
            }
            tracing::warn!(pid, path = %self.path.display(), "removing stale pid lock");
            fs::remove_file(&self.path)?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    DaemonError::AlreadyRunning {
                        pid: self.read_pid().unwrap_or(0),
                    }
                } else {
                    DaemonError::Io(e)
                }
            })?;
        write!(file, "{}", std::process::id())?;
        self.held = true;
        Ok(())
    }

    pub fn release(&mut self) {
        if self.held {
            let _ = fs::remove_file(&self.path);
            self.held = false;
        }
    }

    fn read_pid(&self) -> Option<i32> {
        fs::read_to_string(&self.path)
            .ok()
            .and_then(|text| text.trim().parse().ok())
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    // SAFETY: signal 0 probes for existence without delivering anything.
    let probed = unsafe { libc::kill(pid, 0) };
    probed == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Daemon wrapper: the pid-lock guard, the saved startup arguments, and
/// the server to run.
pub struct Daemon {
    lock: PidLock,
    pub argv: Vec<String>,
    server: Option<Server>,
}

impl Daemon {
    pub fn new(lock: PidLock) -> Self {
        Self {
            lock,
            argv: Vec::new(),
            server: None,
        }
    }

    pub fn set_server(&mut self, server: Server) {
        self.server = Some(server);
    }

    /// Fork and detach from the controlling terminal.
    ///
    /// Must run before the async runtime exists; `start` creates the
    /// runtime afterwards so the lock records the detached pid.
    pub fn daemonize(&self) -> Result<(), DaemonError> {
        // SAFETY: standard double-fork detach; the parent halves exit
        // immediately without running destructors.
        unsafe {
            match libc::fork() {
                -1 => return Err(DaemonError::Fork(io::Error::last_os_error())),
                0 => {}
                _ => libc::_exit(0),
            }
            if libc::setsid() == -1 {
                return Err(DaemonError::Fork(io::Error::last_os_error()));
            }
            match libc::fork() {
                -1 => return Err(DaemonError::Fork(io::Error::last_os_error())),
                0 => {}
                _ => libc::_exit(0),
            }
        }

        std::env::set_current_dir("/")?;
        redirect_stdio_to_devnull()?;
        Ok(())
    }

    /// Acquire the pid lock and run the server until process
    /// termination. Blocks the calling thread.
    pub fn start(mut self) -> Result<(), DaemonError> {
        self.lock.acquire()?;
        let server = self.server.take().ok_or(DaemonError::NoServer)?;

        let runtime = tokio::runtime::Runtime::new()?;
        runtime
            .block_on(server.run())
            .map_err(|e| DaemonError::Server(e.to_string()))
    }
}

fn redirect_stdio_to_devnull() -> io::Result<()> {
    use std::os::fd::AsRawFd;

    let devnull = fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open("/dev/null")?;
    let fd = devnull.as_raw_fd();
    // SAFETY: dup2 onto the standard descriptors.
    unsafe {
        for target in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
            if libc::dup2(fd, target) == -1 {
                return Err(io::Error::last_os_error());
            }
        }
    }
    Ok(())
}
