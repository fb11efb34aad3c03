// src/connection/handler.rs

use super::guard::ConnectionGuard;
use crate::client::Client;
use crate::dispatch::Dispatcher;
use crate::state::ServerState;
use crate::wire::{MessageCodec, Message, Opcode};
use bytes::{Buf, BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio_util::codec::Framed;

/// Owns one connection end to end: frames in, dispatches, frames out,
/// and - when a query asked for exhaust mode and got a live cursor back -
/// keeps pulling get-mores for that cursor without waiting on the client
/// to ask for them.
pub struct ConnectionHandler {
    framed: Framed<TcpStream, MessageCodec>,
    state: Arc<ServerState>,
    dispatcher: Arc<Dispatcher>,
    client: Arc<AsyncMutex<Client>>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ConnectionHandler {
    pub fn new(
        socket: TcpStream,
        state: Arc<ServerState>,
        dispatcher: Arc<Dispatcher>,
        client: Arc<AsyncMutex<Client>>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        ConnectionHandler {
            framed: Framed::new(socket, MessageCodec),
            state,
            dispatcher,
            client,
            shutdown_rx,
        }
    }

    pub async fn run(mut self) {
        let client_id = self.client.lock().await.id;
        let _guard = ConnectionGuard::new(self.state.clone(), client_id);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    tracing::debug!(client_id, "connection closing for server shutdown");
                    break;
                }

                frame = self.framed.next() => {
                    match frame {
                        Some(Ok(message)) => {
                            if !self.process_message(message).await {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            tracing::debug!(client_id, error = %e, "connection closed on protocol error");
                            break;
                        }
                        None => break,
                    }
                }
            }
        }
    }

    /// Returns `false` when the connection should close.
    async fn process_message(&mut self, message: Message) -> bool {
        let response = self.dispatcher.assemble_response(message, &self.client).await;

        let Some(reply) = response.message else {
            return true;
        };
        let cursor_id = reply_cursor_id(&reply);
        if self.framed.send(reply).await.is_err() {
            return false;
        }

        if let Some(ns) = response.exhaust_namespace {
            if cursor_id != 0 {
                self.stream_exhaust(ns, cursor_id).await;
            }
        }

        true
    }

    /// Keeps issuing get-mores against `cursor_id` and writing the
    /// replies straight to the socket, without an inbound request driving
    /// each one, until the cursor is exhausted, the client disconnects,
    /// or a shutdown signal arrives.
    async fn stream_exhaust(&mut self, ns: String, mut cursor_id: i64) {
        while cursor_id != 0 {
            if self.shutdown_rx.try_recv().is_ok() {
                return;
            }

            let mut body = BytesMut::new();
            body.put_i32_le(0);
            body.put_slice(ns.as_bytes());
            body.put_u8(0);
            body.put_i32_le(0);
            body.put_i64_le(cursor_id);

            let message = Message::new(0, 0, Opcode::GetMore, body.freeze());
            let response = self.dispatcher.assemble_response(message, &self.client).await;

            let Some(reply) = response.message else { return };
            cursor_id = reply_cursor_id(&reply);
            if self.framed.send(reply).await.is_err() {
                return;
            }
            if response.exhaust_namespace.is_none() {
                return;
            }
        }
    }
}

/// Pulls the cursor id back out of a reply body: `flags(4) cursor_id(8) ...`.
fn reply_cursor_id(message: &Message) -> i64 {
    let body = &message.body[..];
    if body.len() < 12 {
        return 0;
    }
    (&body[4..12]).get_i64_le()
}
