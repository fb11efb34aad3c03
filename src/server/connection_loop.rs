// src/server/connection_loop.rs

use super::context::ServerContext;
use crate::client::Client;
use crate::connection::ConnectionHandler;
use tokio::task::JoinSet;

#[cfg(unix)]
async fn await_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn await_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Accepts connections until a shutdown signal arrives, then drains
/// in-flight connections before handing off to the shutdown coordinator.
/// Never returns.
pub async fn run(ctx: ServerContext) -> ! {
    let mut client_tasks: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = await_shutdown_signal() => {
                tracing::info!("shutdown signal received");
                break;
            }

            accepted = ctx.listener.accept() => {
                match accepted {
                    Ok((socket, addr)) => {
                        if ctx.state.clients.len() >= ctx.state.config.max_clients {
                            tracing::warn!(%addr, "rejecting connection: max_clients reached");
                            continue;
                        }
                        let client = ctx.state.register_client(Client::new(addr));
                        let handler = ConnectionHandler::new(
                            socket,
                            ctx.state.clone(),
                            ctx.dispatcher.clone(),
                            client,
                            ctx.shutdown_tx.subscribe(),
                        );
                        client_tasks.spawn(handler.run());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept() failed");
                    }
                }
            }

            Some(_) = client_tasks.join_next(), if !client_tasks.is_empty() => {}
        }
    }

    let _ = ctx.shutdown_tx.send(());
    while client_tasks.join_next().await.is_some() {}

    ctx.shutdown.exit_cleanly(0).await
}
