// src/direct_client.rs

use crate::client::Client;
use crate::dispatch::Dispatcher;
use crate::document::Document;
use crate::wire::{query_options, Message, Opcode};
use bytes::{BufMut, BytesMut};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

fn next_request_id() -> i32 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

fn encode_cstring(dst: &mut BytesMut, s: &str) {
    dst.put_slice(s.as_bytes());
    dst.put_u8(0);
}

fn encode_document(dst: &mut BytesMut, doc: &Document) {
    let bytes = serde_json::to_vec(&**doc).unwrap_or_default();
    dst.put_i32_le(bytes.len() as i32);
    dst.put_slice(&bytes);
}

/// An in-process client: the same `send`/`call`/`query`/`count`/
/// `kill_cursor` verbs a socket-backed connection would use, but calling
/// straight into the dispatcher with no serialization round trip over a
/// real transport. Used by collaborators that need to issue a request
/// from inside the server itself.
pub struct DirectClient {
    dispatcher: Arc<Dispatcher>,
    client: Arc<AsyncMutex<Client>>,
}

impl DirectClient {
    pub fn new(dispatcher: Arc<Dispatcher>, client: Arc<AsyncMutex<Client>>) -> Self {
        DirectClient { dispatcher, client }
    }

    /// Sends `message` and returns whatever reply the dispatcher
    /// produced, with any chained buffers concatenated into one
    /// contiguous message.
    pub async fn call(&self, message: Message) -> Option<Message> {
        let response = self.dispatcher.assemble_response(message, &self.client).await;
        response.message
    }

    /// Sends `message` and discards any reply - the fire-and-forget verb
    /// writes use.
    pub async fn say(&self, message: Message) {
        let _ = self.dispatcher.assemble_response(message, &self.client).await;
    }

    /// A direct client can never keep streaming exhaust batches without a
    /// socket to write them to, so the `EXHAUST` option is masked out of
    /// every query this issues - the in-process analogue of
    /// `_lookupAvailableOptions`.
    pub async fn query(
        &self,
        ns: &str,
        query: Document,
        number_to_skip: i32,
        number_to_return: i32,
    ) -> Option<Document> {
        self.query_with_flags(ns, query, number_to_skip, number_to_return, 0).await
    }

    pub async fn query_with_flags(
        &self,
        ns: &str,
        query: Document,
        number_to_skip: i32,
        number_to_return: i32,
        requested_flags: i32,
    ) -> Option<Document> {
        let mut body = BytesMut::new();
        body.put_i32_le(requested_flags & !query_options::EXHAUST);
        encode_cstring(&mut body, ns);
        body.put_i32_le(number_to_skip);
        body.put_i32_le(number_to_return);
        encode_document(&mut body, &query);

        let request_id = next_request_id();
        let message = Message::new(request_id, 0, Opcode::Query, body.freeze());
        let reply = self.call(message).await?;
        first_document_of(&reply)
    }

    /// Treats a `-1` count result (the original's "namespace doesn't
    /// exist" sentinel) as zero documents rather than an error.
    pub async fn count(&self, ns: &str, query: Document) -> i64 {
        match self.query(ns, query, 0, 1).await {
            Some(doc) => doc.get_i64("n").unwrap_or(0).max(0),
            None => 0,
        }
    }

    pub async fn kill_cursor(&self, cursor_id: i64) {
        let mut body = BytesMut::new();
        body.put_i32_le(0);
        body.put_i32_le(1);
        body.put_i64_le(cursor_id);
        let message = Message::new(next_request_id(), 0, Opcode::KillCursors, body.freeze());
        self.say(message).await;
    }
}

/// Reply body layout: `flags(4) cursor_id(8) starting_from(4) n_returned(4) [docs...]`.
fn first_document_of(message: &Message) -> Option<Document> {
    let body = &message.body[..];
    if body.len() < 20 {
        return None;
    }
    let n_returned = i32::from_le_bytes(body[16..20].try_into().ok()?);
    if n_returned <= 0 {
        return None;
    }
    let doc_bytes = &body[20..];
    if doc_bytes.len() < 4 {
        return None;
    }
    let len = i32::from_le_bytes(doc_bytes[..4].try_into().ok()?) as usize;
    let slice = doc_bytes.get(..len)?;
    serde_json::from_slice::<serde_json::Value>(slice)
        .ok()
        .map(Document::new)
}
