// src/connection/guard.rs

use crate::state::ServerState;
use std::sync::Arc;

/// Unregisters a client from the server state's client map on drop, no
/// matter which path out of `ConnectionHandler::run` was taken (clean
/// disconnect, protocol error, or a panic unwinding through the task).
pub struct ConnectionGuard {
    state: Arc<ServerState>,
    client_id: u64,
}

impl ConnectionGuard {
    pub fn new(state: Arc<ServerState>, client_id: u64) -> Self {
        ConnectionGuard { state, client_id }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state.unregister_client(self.client_id);
        self.state.curops.clear_client(self.client_id);
    }
}
