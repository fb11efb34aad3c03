// tests/common/mod.rs

use bytes::{BufMut, BytesMut};
use corvusdb::client::Client;
use corvusdb::config::Config;
use corvusdb::dispatch::Dispatcher;
use corvusdb::document::Document;
use corvusdb::state::ServerState;
use corvusdb::testutil::in_memory_collaborators;
use corvusdb::wire::{Message, Opcode};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

static NEXT_REQUEST_ID: AtomicI32 = AtomicI32::new(1);

/// A scratch server built entirely on in-memory collaborators, wired the
/// same way `server::initialization::setup` wires a real one.
pub struct TestContext {
    pub state: Arc<ServerState>,
    pub dispatcher: Arc<Dispatcher>,
    pub client: Arc<AsyncMutex<Client>>,
    _dbpath: tempfile::TempDir,
}

impl TestContext {
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.dbpath = dir.path().to_path_buf();

        let state = ServerState::new(config, in_memory_collaborators());
        let dispatcher = Arc::new(Dispatcher::new(state.clone()));
        let mut new_client = Client::new("127.0.0.1:9001".parse().unwrap());
        new_client.auth.authenticated = true;
        let client = state.register_client(new_client);
        TestContext { state, dispatcher, client, _dbpath: dir }
    }

    fn next_request_id(&self) -> i32 {
        NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
    }

    pub async fn insert(&self, ns: &str, doc: serde_json::Value) {
        let mut body = BytesMut::new();
        body.put_i32_le(0);
        encode_cstring(&mut body, ns);
        encode_document(&mut body, &doc);
        let message = Message::new(self.next_request_id(), 0, Opcode::Insert, body.freeze());
        self.dispatcher.assemble_response(message, &self.client).await;
    }

    pub async fn update(&self, ns: &str, selector: serde_json::Value, update: serde_json::Value, upsert: bool, multi: bool) {
        let mut flags = 0;
        if upsert {
            flags |= 1 << 0;
        }
        if multi {
            flags |= 1 << 1;
        }
        let mut body = BytesMut::new();
        body.put_i32_le(0);
        encode_cstring(&mut body, ns);
        body.put_i32_le(flags);
        encode_document(&mut body, &selector);
        encode_document(&mut body, &update);
        let message = Message::new(self.next_request_id(), 0, Opcode::Update, body.freeze());
        self.dispatcher.assemble_response(message, &self.client).await;
    }

    pub async fn delete(&self, ns: &str, selector: serde_json::Value, just_one: bool) {
        let mut body = BytesMut::new();
        body.put_i32_le(0);
        encode_cstring(&mut body, ns);
        body.put_i32_le(if just_one { 1 } else { 0 });
        encode_document(&mut body, &selector);
        let message = Message::new(self.next_request_id(), 0, Opcode::Delete, body.freeze());
        self.dispatcher.assemble_response(message, &self.client).await;
    }

    pub async fn query(&self, ns: &str, query: serde_json::Value, limit: i32) -> Vec<Document> {
        let mut body = BytesMut::new();
        body.put_i32_le(0);
        encode_cstring(&mut body, ns);
        body.put_i32_le(0);
        body.put_i32_le(limit);
        encode_document(&mut body, &query);
        let message = Message::new(self.next_request_id(), 0, Opcode::Query, body.freeze());
        let response = self.dispatcher.assemble_response(message, &self.client).await;
        documents_of(&response.message.expect("query always replies"))
    }

    pub async fn get_more(&self, ns: &str, cursor_id: i64) -> (Vec<Document>, i64) {
        let mut body = BytesMut::new();
        body.put_i32_le(0);
        encode_cstring(&mut body, ns);
        body.put_i32_le(0);
        body.put_i64_le(cursor_id);
        let message = Message::new(self.next_request_id(), 0, Opcode::GetMore, body.freeze());
        let response = self.dispatcher.assemble_response(message, &self.client).await;
        let reply = response.message.expect("get_more always replies");
        let docs = documents_of(&reply);
        let next_cursor = i64::from_le_bytes(reply.body[4..12].try_into().unwrap());
        (docs, next_cursor)
    }

    pub async fn kill_cursors(&self, cursor_ids: &[i64]) {
        let mut body = BytesMut::new();
        body.put_i32_le(0);
        body.put_i32_le(cursor_ids.len() as i32);
        for id in cursor_ids {
            body.put_i64_le(*id);
        }
        let message = Message::new(self.next_request_id(), 0, Opcode::KillCursors, body.freeze());
        self.dispatcher.assemble_response(message, &self.client).await;
    }

    pub async fn last_error(&self) -> corvusdb::lasterror::LastError {
        self.client.lock().await.last_error.clone()
    }
}

fn encode_cstring(dst: &mut BytesMut, s: &str) {
    dst.put_slice(s.as_bytes());
    dst.put_u8(0);
}

fn encode_document(dst: &mut BytesMut, doc: &serde_json::Value) {
    let bytes = serde_json::to_vec(doc).unwrap();
    dst.put_i32_le(bytes.len() as i32);
    dst.put_slice(&bytes);
}

fn documents_of(message: &Message) -> Vec<Document> {
    let body = &message.body[..];
    if body.len() < 20 {
        return Vec::new();
    }
    let n_returned = i32::from_le_bytes(body[16..20].try_into().unwrap());
    let mut cursor = &body[20..];
    let mut out = Vec::new();
    for _ in 0..n_returned.max(0) {
        if cursor.len() < 4 {
            break;
        }
        let len = i32::from_le_bytes(cursor[..4].try_into().unwrap()) as usize;
        let Some(slice) = cursor.get(..len) else { break };
        if let Ok(value) = serde_json::from_slice::<serde_json::Value>(slice) {
            out.push(Document::new(value));
        }
        cursor = &cursor[len..];
    }
    out
}
