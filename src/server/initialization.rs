// src/server/initialization.rs

use super::context::ServerContext;
use crate::collaborators::Collaborators;
use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::shutdown::{InstanceLock, ShutdownCoordinator};
use crate::state::ServerState;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Binds the listener, opens the instance lock file, and wires up the
/// dispatcher and shutdown coordinator against a fresh `ServerState`.
pub async fn setup(config: Config, collaborators: Collaborators) -> Result<ServerContext> {
    tracing::info!(
        bind = %config.bind_address,
        port = config.port,
        dbpath = %config.dbpath.display(),
        "starting corvusdb",
    );

    std::fs::create_dir_all(&config.dbpath)
        .with_context(|| format!("creating dbpath {}", config.dbpath.display()))?;

    let instance_lock = InstanceLock::acquire(&config.dbpath)
        .with_context(|| "acquiring dbpath instance lock")?;

    let listen_addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding {listen_addr}"))?;

    let state = ServerState::new(config, collaborators);
    let dispatcher = Arc::new(Dispatcher::new(state.clone()));
    let shutdown = Arc::new(ShutdownCoordinator::new(state.clone(), Some(instance_lock)));
    let (shutdown_tx, _) = broadcast::channel(16);

    crate::metrics::register();

    Ok(ServerContext {
        state,
        dispatcher,
        shutdown,
        listener,
        shutdown_tx,
    })
}
