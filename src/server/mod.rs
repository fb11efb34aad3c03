// src/server/mod.rs

mod connection_loop;
mod context;
mod initialization;

pub use context::ServerContext;

use crate::collaborators::Collaborators;
use crate::config::Config;
use anyhow::Result;

/// The top-level server entry point: bind, wire up state, accept
/// connections until shutdown. Never returns on success.
pub async fn run(config: Config, collaborators: Collaborators) -> Result<()> {
    let ctx = initialization::setup(config, collaborators).await?;
    connection_loop::run(ctx).await;
}
