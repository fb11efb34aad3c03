// src/client.rs

use crate::lasterror::LastError;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Which lock mode a cursor's reads are entitled to run under. Write
/// handlers request `WriteLockCursor` before touching storage so a
/// cursor opened mid-write is never mistaken for one that can proceed
/// under a plain read lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorMode {
    #[default]
    ReadLockCursor,
    WriteLockCursor,
}

/// Per-request settings reset at request entry, mirroring the original's
/// default `OpSettings` reset before each dispatch.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpSettings {
    pub slave_ok: bool,
    pub cursor_mode: CursorMode,
}

/// Minimal authentication record. Authentication and authorization
/// mechanisms themselves are out of scope; this only carries enough to
/// gate the admin sub-dispatcher and the write-path authorization check.
#[derive(Debug, Clone, Default)]
pub struct AuthInfo {
    pub authenticated: bool,
    pub is_admin: bool,
}

/// Per-connection client context: identity, auth state, per-request
/// settings, and the last-error slot spec §3 describes.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: u64,
    pub addr: SocketAddr,
    pub auth: AuthInfo,
    pub op_settings: OpSettings,
    pub last_error: LastError,
}

impl Client {
    pub fn new(addr: SocketAddr) -> Self {
        Client {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
            addr,
            auth: AuthInfo::default(),
            op_settings: OpSettings::default(),
            last_error: LastError::default(),
        }
    }

    /// Resets everything that must not leak across requests on the same
    /// connection: last-error slot and op-settings.
    pub fn begin_request(&mut self) {
        self.last_error.reset();
        self.op_settings = OpSettings::default();
    }
}
