// tests/admin_test.rs

mod common;

use bytes::{BufMut, BytesMut};
use common::TestContext;
use corvusdb::wire::{Message, Opcode};
use serde_json::json;

fn query_message(request_id: i32, ns: &str, query: serde_json::Value) -> Message {
    let mut body = BytesMut::new();
    body.put_i32_le(0);
    body.put_slice(ns.as_bytes());
    body.put_u8(0);
    body.put_i32_le(0);
    body.put_i32_le(0);
    let doc = serde_json::to_vec(&query).unwrap();
    body.put_i32_le(doc.len() as i32);
    body.put_slice(&doc);
    Message::new(request_id, 0, Opcode::Query, body.freeze())
}

fn first_doc_of(message: &Message) -> serde_json::Value {
    let body = &message.body[..];
    let len = i32::from_le_bytes(body[20..24].try_into().unwrap()) as usize;
    serde_json::from_slice(&body[24..24 + len]).unwrap()
}

#[tokio::test]
async fn non_admin_caller_gets_unauthorized_without_an_error_reply() {
    let ctx = TestContext::new();
    let message = query_message(1, "admin.$cmd.sys.inprog", json!({}));
    let response = ctx.dispatcher.assemble_response(message, &ctx.client).await;
    let doc = first_doc_of(&response.message.unwrap());
    assert_eq!(doc["err"], "unauthorized");
}

#[tokio::test]
async fn admin_can_list_in_progress_operations() {
    let ctx = TestContext::new();
    ctx.client.lock().await.auth.is_admin = true;

    let message = query_message(1, "admin.$cmd.sys.inprog", json!({}));
    let response = ctx.dispatcher.assemble_response(message, &ctx.client).await;
    let doc = first_doc_of(&response.message.unwrap());
    assert!(doc["inprog"].is_array());
}

#[tokio::test]
async fn kill_op_without_a_numeric_op_field_reports_an_error_document() {
    let ctx = TestContext::new();
    ctx.client.lock().await.auth.is_admin = true;

    let message = query_message(1, "admin.$cmd.sys.killop", json!({}));
    let response = ctx.dispatcher.assemble_response(message, &ctx.client).await;
    let doc = first_doc_of(&response.message.unwrap());
    assert_eq!(doc["ok"], 0);
    assert_eq!(doc["errmsg"], "no op in killOp command object");
}

#[tokio::test]
async fn kill_op_with_a_numeric_op_field_acknowledges_the_attempt() {
    let ctx = TestContext::new();
    ctx.client.lock().await.auth.is_admin = true;

    let message = query_message(1, "admin.$cmd.sys.killop", json!({"op": 12345}));
    let response = ctx.dispatcher.assemble_response(message, &ctx.client).await;
    let doc = first_doc_of(&response.message.unwrap());
    assert_eq!(doc["info"], "attempting to kill op");
}

#[tokio::test]
async fn unlock_reports_not_locked_when_fsync_lock_was_never_taken() {
    let ctx = TestContext::new();
    ctx.client.lock().await.auth.is_admin = true;

    let message = query_message(1, "admin.$cmd.sys.unlock", json!({}));
    let response = ctx.dispatcher.assemble_response(message, &ctx.client).await;
    let doc = first_doc_of(&response.message.unwrap());
    assert_eq!(doc["ok"], 0);
    assert_eq!(doc["errmsg"], "not locked");
}

#[tokio::test]
async fn inprog_does_not_require_the_admin_database() {
    let ctx = TestContext::new();
    ctx.client.lock().await.auth.is_admin = true;

    let message = query_message(1, "foo.$cmd.sys.inprog", json!({}));
    let response = ctx.dispatcher.assemble_response(message, &ctx.client).await;
    let doc = first_doc_of(&response.message.unwrap());
    assert!(doc["inprog"].is_array());
}

#[tokio::test]
async fn unlock_against_a_non_admin_database_is_rejected() {
    let ctx = TestContext::new();
    ctx.client.lock().await.auth.is_admin = true;
    ctx.state.fsync_locked.store(true, std::sync::atomic::Ordering::SeqCst);

    let message = query_message(1, "foo.$cmd.sys.unlock", json!({}));
    let response = ctx.dispatcher.assemble_response(message, &ctx.client).await;
    let doc = first_doc_of(&response.message.unwrap());
    assert_eq!(doc["ok"], 0);
    assert_eq!(doc["errmsg"], "unlock must be run against the admin database");
    assert!(ctx.state.fsync_locked.load(std::sync::atomic::Ordering::SeqCst));
}

#[tokio::test]
async fn inprog_filters_by_a_subset_match_query() {
    let ctx = TestContext::new();
    ctx.client.lock().await.auth.is_admin = true;
    let client_id = ctx.client.lock().await.id;
    let _op = ctx.state.curops.start(client_id, "query", Some("test.widgets".to_string()));

    let message = query_message(1, "admin.$cmd.sys.inprog", json!({"ns": "test.other"}));
    let response = ctx.dispatcher.assemble_response(message, &ctx.client).await;
    let doc = first_doc_of(&response.message.unwrap());
    assert_eq!(doc["inprog"].as_array().unwrap().len(), 0, "the registered op's ns doesn't match the filter");

    let message = query_message(2, "admin.$cmd.sys.inprog", json!({"ns": "test.widgets"}));
    let response = ctx.dispatcher.assemble_response(message, &ctx.client).await;
    let doc = first_doc_of(&response.message.unwrap());
    assert_eq!(doc["inprog"].as_array().unwrap().len(), 1, "the registered op's ns matches the filter");
}

#[tokio::test]
async fn inprog_with_all_bypasses_filtering() {
    let ctx = TestContext::new();
    ctx.client.lock().await.auth.is_admin = true;
    let client_id = ctx.client.lock().await.id;
    let _op = ctx.state.curops.start(client_id, "query", Some("test.widgets".to_string()));

    let message = query_message(1, "admin.$cmd.sys.inprog", json!({"ns": "test.other", "$all": true}));
    let response = ctx.dispatcher.assemble_response(message, &ctx.client).await;
    let doc = first_doc_of(&response.message.unwrap());
    assert_eq!(doc["inprog"].as_array().unwrap().len(), 1, "$all bypasses the non-matching ns filter");
}

#[tokio::test]
async fn unlock_succeeds_once_the_fsync_lock_is_held() {
    let ctx = TestContext::new();
    ctx.client.lock().await.auth.is_admin = true;
    ctx.state.fsync_locked.store(true, std::sync::atomic::Ordering::SeqCst);

    let message = query_message(1, "admin.$cmd.sys.unlock", json!({}));
    let response = ctx.dispatcher.assemble_response(message, &ctx.client).await;
    let doc = first_doc_of(&response.message.unwrap());
    assert_eq!(doc["ok"], 1);
    assert_eq!(doc["info"], "unlock completed");
}
