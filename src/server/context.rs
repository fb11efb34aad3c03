// src/server/context.rs

use crate::dispatch::Dispatcher;
use crate::shutdown::ShutdownCoordinator;
use crate::state::ServerState;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Everything the connection-accept loop needs, assembled once during
/// startup.
pub struct ServerContext {
    pub state: Arc<ServerState>,
    pub dispatcher: Arc<Dispatcher>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
}
