// tests/dispatch_test.rs

mod common;

use common::TestContext;
use corvusdb::client::{Client as RawClient, CursorMode};
use corvusdb::collaborators::{InsertValidator, ReplicationPredicates, ShardDecision, ShardingHook};
use corvusdb::config::Config;
use corvusdb::dispatch::Dispatcher;
use corvusdb::namespace::Namespace;
use corvusdb::optime::OpTime;
use corvusdb::state::{Collaborators, ServerState};
use corvusdb::testutil::InMemoryStore;
use serde_json::json;
use std::sync::Arc;

struct NeverPrimary;

impl ShardingHook for NeverPrimary {
    fn maybe_redirect_or_reject(&self, _ns: &Namespace, _client: &RawClient) -> ShardDecision {
        ShardDecision::Proceed
    }
}

impl ReplicationPredicates for NeverPrimary {
    fn is_primary_for_namespace(&self, _ns: &Namespace) -> bool {
        false
    }

    fn min_live_commit_id(&self) -> OpTime {
        OpTime::default()
    }
}

#[tokio::test]
async fn update_on_a_secondary_sets_not_master_and_does_not_write() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.dbpath = dir.path().to_path_buf();

    let store = InMemoryStore::new();
    let topology = Arc::new(NeverPrimary);
    let collaborators = Collaborators {
        query_planner: store.clone(),
        cursor_store: store.clone(),
        update_executor: store.clone(),
        delete_executor: store.clone(),
        insert_validator: store.clone(),
        storage: store,
        sharding: topology.clone(),
        replication: topology,
    };

    let state = ServerState::new(config, collaborators);
    let dispatcher = Dispatcher::new(state.clone());
    let mut raw_client = RawClient::new("127.0.0.1:9002".parse().unwrap());
    raw_client.auth.authenticated = true;
    let client = state.register_client(raw_client);

    let mut body = bytes::BytesMut::new();
    use bytes::BufMut;
    body.put_i32_le(0);
    body.put_slice(b"test.widgets\0");
    body.put_i32_le(0);
    let selector = serde_json::to_vec(&json!({})).unwrap();
    body.put_i32_le(selector.len() as i32);
    body.put_slice(&selector);
    let update = serde_json::to_vec(&json!({"x": 1})).unwrap();
    body.put_i32_le(update.len() as i32);
    body.put_slice(&update);
    let message = corvusdb::wire::Message::new(1, 0, corvusdb::wire::Opcode::Update, body.freeze());

    dispatcher.assemble_response(message, &client).await;
    let last_error = client.lock().await.last_error.clone();
    assert_eq!(last_error.code, Some(10054));
}

#[tokio::test]
async fn insert_then_query_round_trips() {
    let ctx = TestContext::new();
    ctx.insert("test.widgets", json!({"_id": 1, "name": "a"})).await;
    ctx.insert("test.widgets", json!({"_id": 2, "name": "b"})).await;

    let docs = ctx.query("test.widgets", json!({}), 0).await;
    assert_eq!(docs.len(), 2);
}

#[tokio::test]
async fn query_batches_and_get_more_drains_the_rest() {
    let ctx = TestContext::new();
    for i in 0..5 {
        ctx.insert("test.widgets", json!({"_id": i})).await;
    }

    // InMemoryStore batches two documents per reply and hands back a cursor
    // for the remainder; recover that cursor id alongside the first batch.
    let cursor_id = cursor_id_of(&ctx, "test.widgets").await;
    assert_ne!(cursor_id, 0, "three documents remain after the first batch, cursor must stay alive");

    let (second_batch, cursor_id) = ctx.get_more("test.widgets", cursor_id).await;
    assert_eq!(second_batch.len(), 2);
    assert_ne!(cursor_id, 0, "one document still remains, cursor must stay alive");

    let (third_batch, final_cursor_id) = ctx.get_more("test.widgets", cursor_id).await;
    assert_eq!(third_batch.len(), 1);
    assert_eq!(final_cursor_id, 0, "cursor exhausts once the last document is drained");
}

async fn cursor_id_of(ctx: &TestContext, ns: &str) -> i64 {
    // Re-issue the same query to recover the cursor id the first call
    // opened, since `query` only returns the documents.
    let mut body = bytes::BytesMut::new();
    use bytes::BufMut;
    body.put_i32_le(0);
    body.put_slice(ns.as_bytes());
    body.put_u8(0);
    body.put_i32_le(0);
    body.put_i32_le(0);
    let doc = serde_json::to_vec(&json!({})).unwrap();
    body.put_i32_le(doc.len() as i32);
    body.put_slice(&doc);
    let message = corvusdb::wire::Message::new(1, 0, corvusdb::wire::Opcode::Query, body.freeze());
    let response = ctx.dispatcher.assemble_response(message, &ctx.client).await;
    let reply = response.message.unwrap();
    i64::from_le_bytes(reply.body[4..12].try_into().unwrap())
}

#[tokio::test]
async fn update_matches_and_reports_n_matched() {
    let ctx = TestContext::new();
    ctx.insert("test.widgets", json!({"_id": 1, "qty": 1})).await;

    ctx.update(
        "test.widgets",
        json!({"_id": 1}),
        json!({"_id": 1, "qty": 2}),
        false,
        false,
    )
    .await;

    let last_error = ctx.last_error().await;
    assert!(last_error.is_ok());
    assert_eq!(last_error.n_updated, 1);
    assert_eq!(last_error.updated_existing, Some(true));

    let docs = ctx.query("test.widgets", json!({"_id": 1}), 0).await;
    assert_eq!(docs[0].get("qty").and_then(|v| v.as_i64()), Some(2));
}

#[tokio::test]
async fn update_with_upsert_inserts_when_nothing_matches() {
    let ctx = TestContext::new();

    ctx.update(
        "test.widgets",
        json!({"_id": 99}),
        json!({"_id": 99, "qty": 1}),
        true,
        false,
    )
    .await;

    let last_error = ctx.last_error().await;
    assert_eq!(last_error.updated_existing, Some(false));
    assert_eq!(last_error.n_updated, 1);

    let docs = ctx.query("test.widgets", json!({"_id": 99}), 0).await;
    assert_eq!(docs.len(), 1);
}

#[tokio::test]
async fn delete_just_one_removes_a_single_document() {
    let ctx = TestContext::new();
    ctx.insert("test.widgets", json!({"_id": 1, "tag": "x"})).await;
    ctx.insert("test.widgets", json!({"_id": 2, "tag": "x"})).await;

    ctx.delete("test.widgets", json!({"tag": "x"}), true).await;

    let last_error = ctx.last_error().await;
    assert_eq!(last_error.n_deleted, 1);

    let remaining = ctx.query("test.widgets", json!({"tag": "x"}), 0).await;
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn delete_multi_removes_every_match() {
    let ctx = TestContext::new();
    ctx.insert("test.widgets", json!({"_id": 1, "tag": "x"})).await;
    ctx.insert("test.widgets", json!({"_id": 2, "tag": "x"})).await;
    ctx.insert("test.widgets", json!({"_id": 3, "tag": "y"})).await;

    ctx.delete("test.widgets", json!({"tag": "x"}), false).await;

    let last_error = ctx.last_error().await;
    assert_eq!(last_error.n_deleted, 2);

    let remaining = ctx.query("test.widgets", json!({}), 0).await;
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn unauthenticated_insert_sets_last_error_and_does_not_write() {
    let ctx = TestContext::new();
    ctx.client.lock().await.auth.authenticated = false;

    ctx.insert("test.widgets", json!({"_id": 1})).await;
    let last_error = ctx.last_error().await;
    assert!(!last_error.is_ok());

    ctx.client.lock().await.auth.authenticated = true;
    let docs = ctx.query("test.widgets", json!({}), 0).await;
    assert!(docs.is_empty());
}

#[tokio::test]
async fn insert_with_a_malformed_namespace_sets_last_error_code_16257() {
    let ctx = TestContext::new();
    ctx.insert("", json!({"_id": 1})).await;
    let last_error = ctx.last_error().await;
    assert_eq!(last_error.code, Some(16257));
}

#[tokio::test]
async fn kill_cursors_makes_a_subsequent_get_more_report_not_found() {
    let ctx = TestContext::new();
    for i in 0..5 {
        ctx.insert("test.widgets", json!({"_id": i})).await;
    }
    let cursor_id = cursor_id_of(&ctx, "test.widgets").await;

    ctx.kill_cursors(&[cursor_id]).await;

    let (docs, next_cursor_id) = ctx.get_more("test.widgets", cursor_id).await;
    assert!(docs.is_empty());
    assert_eq!(next_cursor_id, 0);
}

#[tokio::test]
async fn insert_leaves_op_settings_in_write_lock_cursor_mode() {
    let ctx = TestContext::new();
    ctx.insert("test.widgets", json!({"_id": 1})).await;
    let cursor_mode = ctx.client.lock().await.op_settings.cursor_mode;
    assert_eq!(cursor_mode, CursorMode::WriteLockCursor);
}

#[tokio::test]
async fn insert_with_continue_on_error_keeps_going_past_a_bad_document() {
    let ctx = TestContext::new();
    let oversized = "a".repeat(17 * 1024 * 1024);

    const CONTINUE_ON_ERROR_FLAG: i32 = 1 << 0;
    let mut body = bytes::BytesMut::new();
    use bytes::BufMut;
    body.put_i32_le(CONTINUE_ON_ERROR_FLAG);
    body.put_slice(b"test.widgets\0");
    for doc in [json!({"_id": 1}), json!({"_id": 2, "pad": oversized}), json!({"_id": 3})] {
        let encoded = serde_json::to_vec(&doc).unwrap();
        body.put_i32_le(encoded.len() as i32);
        body.put_slice(&encoded);
    }
    let message = corvusdb::wire::Message::new(1, 0, corvusdb::wire::Opcode::Insert, body.freeze());
    ctx.dispatcher.assemble_response(message, &ctx.client).await;

    let last_error = ctx.last_error().await;
    assert_eq!(last_error.code, Some(10059), "the oversized document's failure is still recorded");

    let docs = ctx.query("test.widgets", json!({}), 0).await;
    assert_eq!(docs.len(), 2, "both valid documents were inserted despite the failure between them");
}

#[tokio::test]
async fn insert_without_continue_on_error_aborts_the_whole_batch_on_first_failure() {
    let ctx = TestContext::new();
    let oversized = "a".repeat(17 * 1024 * 1024);

    let mut body = bytes::BytesMut::new();
    use bytes::BufMut;
    body.put_i32_le(0);
    body.put_slice(b"test.widgets\0");
    for doc in [json!({"_id": 1, "pad": oversized}), json!({"_id": 2})] {
        let encoded = serde_json::to_vec(&doc).unwrap();
        body.put_i32_le(encoded.len() as i32);
        body.put_slice(&encoded);
    }
    let message = corvusdb::wire::Message::new(1, 0, corvusdb::wire::Opcode::Insert, body.freeze());
    ctx.dispatcher.assemble_response(message, &ctx.client).await;

    let last_error = ctx.last_error().await;
    assert_eq!(last_error.code, Some(10059));

    let docs = ctx.query("test.widgets", json!({}), 0).await;
    assert!(docs.is_empty(), "nothing is inserted once the batch aborts on the first failure");
}

struct AlwaysRejectShard;

impl ShardingHook for AlwaysRejectShard {
    fn maybe_redirect_or_reject(&self, _ns: &Namespace, _client: &RawClient) -> ShardDecision {
        ShardDecision::Reject { reason: "not on this shard".into() }
    }
}

impl ReplicationPredicates for AlwaysRejectShard {
    fn is_primary_for_namespace(&self, _ns: &Namespace) -> bool {
        true
    }

    fn min_live_commit_id(&self) -> OpTime {
        OpTime::default()
    }
}

fn update_message(request_id: i32, ns: &str, selector: serde_json::Value, update: serde_json::Value, flags: i32) -> corvusdb::wire::Message {
    let mut body = bytes::BytesMut::new();
    use bytes::BufMut;
    body.put_i32_le(0);
    body.put_slice(ns.as_bytes());
    body.put_u8(0);
    body.put_i32_le(flags);
    let selector = serde_json::to_vec(&selector).unwrap();
    body.put_i32_le(selector.len() as i32);
    body.put_slice(&selector);
    let update = serde_json::to_vec(&update).unwrap();
    body.put_i32_le(update.len() as i32);
    body.put_slice(&update);
    corvusdb::wire::Message::new(request_id, 0, corvusdb::wire::Opcode::Update, body.freeze())
}

#[tokio::test]
async fn broadcast_flag_suppresses_the_sharding_hook_on_update() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.dbpath = dir.path().to_path_buf();

    let store = InMemoryStore::new();
    let topology = Arc::new(AlwaysRejectShard);
    let collaborators = Collaborators {
        query_planner: store.clone(),
        cursor_store: store.clone(),
        update_executor: store.clone(),
        delete_executor: store.clone(),
        insert_validator: store.clone(),
        storage: store,
        sharding: topology.clone(),
        replication: topology,
    };

    let state = ServerState::new(config, collaborators);
    let dispatcher = Dispatcher::new(state.clone());
    let mut raw_client = RawClient::new("127.0.0.1:9004".parse().unwrap());
    raw_client.auth.authenticated = true;
    let client = state.register_client(raw_client);

    let message = update_message(1, "test.widgets", json!({"_id": 1}), json!({"_id": 1, "x": 1}), 0);
    dispatcher.assemble_response(message, &client).await;
    assert_eq!(client.lock().await.last_error.code, Some(13388));

    const BROADCAST_FLAG: i32 = 1 << 2;
    let message = update_message(2, "test.widgets", json!({"_id": 1}), json!({"_id": 1, "x": 2}), BROADCAST_FLAG);
    dispatcher.assemble_response(message, &client).await;
    assert!(client.lock().await.last_error.is_ok());
}

#[tokio::test]
async fn get_more_on_a_secondary_sets_not_master() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.dbpath = dir.path().to_path_buf();

    let store = InMemoryStore::new();
    let ns = Namespace::parse("test.widgets").unwrap();
    for i in 0..5 {
        store.insert(&ns, &[corvusdb::document::Document::new(json!({"_id": i}))]).await.unwrap();
    }

    let topology = Arc::new(NeverPrimary);
    let collaborators = Collaborators {
        query_planner: store.clone(),
        cursor_store: store.clone(),
        update_executor: store.clone(),
        delete_executor: store.clone(),
        insert_validator: store.clone(),
        storage: store,
        sharding: topology.clone(),
        replication: topology,
    };

    let state = ServerState::new(config, collaborators);
    let dispatcher = Dispatcher::new(state.clone());
    let mut raw_client = RawClient::new("127.0.0.1:9006".parse().unwrap());
    raw_client.auth.authenticated = true;
    let client = state.register_client(raw_client);

    // Querying isn't gated on primary status in this crate; only the
    // get-more read-permission check is (exercised directly as a unit
    // test in src/handlers/get_more.rs, since `begin_request` resets
    // `op_settings` before every dispatched request and `GET_MORE`'s
    // wire payload has no flags field to set `slave_ok` back from here).
    let mut body = bytes::BytesMut::new();
    use bytes::BufMut;
    body.put_i32_le(0);
    body.put_slice(b"test.widgets\0");
    body.put_i32_le(0);
    body.put_i32_le(0);
    let doc = serde_json::to_vec(&json!({})).unwrap();
    body.put_i32_le(doc.len() as i32);
    body.put_slice(&doc);
    let message = corvusdb::wire::Message::new(1, 0, corvusdb::wire::Opcode::Query, body.freeze());
    let response = dispatcher.assemble_response(message, &client).await;
    let reply = response.message.unwrap();
    let cursor_id = i64::from_le_bytes(reply.body[4..12].try_into().unwrap());
    assert_ne!(cursor_id, 0, "five documents remain after the first batch");

    let mut body = bytes::BytesMut::new();
    body.put_i32_le(0);
    body.put_slice(b"test.widgets\0");
    body.put_i32_le(0);
    body.put_i64_le(cursor_id);
    let message = corvusdb::wire::Message::new(2, 0, corvusdb::wire::Opcode::GetMore, body.freeze());
    let response = dispatcher.assemble_response(message, &client).await;
    let reply = response.message.unwrap();
    let len = i32::from_le_bytes(reply.body[20..24].try_into().unwrap()) as usize;
    let doc: serde_json::Value = serde_json::from_slice(&reply.body[24..24 + len]).unwrap();
    assert_eq!(doc["code"], 10054, "a secondary rejects get-more reads without slave_ok");
}
