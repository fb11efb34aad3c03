// src/shutdown.rs

use crate::state::ServerState;
use once_cell::sync::OnceCell;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static REPORT_HOOK: OnceCell<fn(&str)> = OnceCell::new();

/// Registers an external-reporting hook invoked once, before the process
/// actually aborts. Optional; mirrors `reportEventToSystem` in the
/// original's `mongoAbort`.
pub fn set_report_hook(hook: fn(&str)) {
    let _ = REPORT_HOOK.set(hook);
}

/// Reports `msg` through the optional hook, then aborts the process
/// unconditionally. Never returns.
pub fn abort(msg: &str) -> ! {
    if let Some(hook) = REPORT_HOOK.get() {
        hook(msg);
    }
    tracing::error!(%msg, "fatal assertion, aborting process");
    std::process::abort();
}

/// An exclusively-held, fsync'd on-disk lock file marking that an
/// instance of the server owns `dbpath`. Dropped only on a clean
/// `dbexit`; a crash leaves it behind for the next startup attempt to
/// detect and refuse to run alongside.
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(dbpath: &Path) -> std::io::Result<Self> {
        let path = dbpath.join("mongod.lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WouldBlock,
                "Unable to lock the dbpath directory - is another corvusdb instance already running?",
            ));
        }

        let mut lock = InstanceLock { file, path };
        lock.write_pid()?;
        Ok(lock)
    }

    fn write_pid(&mut self) -> std::io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        write!(self.file, "{}", std::process::id())?;
        self.file.sync_all()?;
        if let Some(dir) = self.path.parent() {
            if let Ok(dir_handle) = File::open(dir) {
                let _ = dir_handle.sync_all();
            }
        }
        Ok(())
    }

    pub fn release(&self) {
        self.file.set_len(0).ok();
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}

/// Orchestrates graceful shutdown. `exit_cleanly` is the public entry
/// point (triggered by a signal or an admin request); `dbexit` is the
/// idempotent core every call path funnels through.
pub struct ShutdownCoordinator {
    state: Arc<ServerState>,
    instance_lock: Option<InstanceLock>,
    exit_calls: AtomicU64,
}

impl ShutdownCoordinator {
    pub fn new(state: Arc<ServerState>, instance_lock: Option<InstanceLock>) -> Self {
        ShutdownCoordinator {
            state,
            instance_lock,
            exit_calls: AtomicU64::new(0),
        }
    }

    /// Kills every in-flight operation first (so long-running scans
    /// notice promptly), then acquires the global write lock before
    /// handing off to `dbexit`. Never returns.
    pub async fn exit_cleanly(&self, code: i32) -> ! {
        self.state.shutting_down.store(true, Ordering::SeqCst);
        self.state.curops.kill_all();
        tracing::info!("stepping down from primary before shutdown");
        let _global = self.state.locks.acquire_global_write().await;
        self.dbexit(code)
    }

    /// Idempotent with call-count escalation: the first call runs the
    /// full teardown sequence; calls two through five log a warning and
    /// exit immediately; call six onward exits without even logging,
    /// matching the original's `numExitCalls` guard.
    pub fn dbexit(&self, code: i32) -> ! {
        let calls = self.exit_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if calls == 1 {
            self.state.diaglog.flush();
            if let Some(lock) = &self.instance_lock {
                lock.release();
            }
            tracing::info!(code, "corvusdb shutting down");
            std::process::exit(code);
        }

        if calls <= 5 {
            tracing::error!(code, calls, "dbexit called again, exiting immediately");
        }
        std::process::exit(code);
    }
}
