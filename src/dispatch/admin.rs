// src/dispatch/admin.rs

use crate::client::Client;
use crate::document::Document;
use crate::namespace::{AdminPseudoCommand, Namespace};
use crate::response::DbResponse;
use crate::state::ServerState;
use serde_json::json;
use std::sync::atomic::Ordering;

/// The admin sub-dispatcher: `list-in-progress`, `kill-op`, and
/// `unlock-fsync`, recognized by namespace before any `CurOp` is created
/// and gated on admin privilege. An unauthorized caller gets
/// `{"err":"unauthorized"}` back with an ordinary success status, not an
/// error reply — mirroring `instance.cpp`'s `inProgCmd`/`killOp`/
/// `unlockFsync` exactly.
pub fn dispatch(
    state: &ServerState,
    cmd: AdminPseudoCommand,
    ns: &Namespace,
    query: &Document,
    client: &Client,
    request_id: i32,
) -> DbResponse {
    if !client.auth.is_admin {
        return DbResponse::single_document(request_id, &Document::new(json!({"err": "unauthorized"})));
    }

    match cmd {
        AdminPseudoCommand::InProg => in_prog(state, query, request_id),
        AdminPseudoCommand::KillOp => kill_op(state, query, request_id),
        AdminPseudoCommand::Unlock => unlock(state, ns, request_id),
    }
}

fn in_prog(state: &ServerState, query: &Document, request_id: i32) -> DbResponse {
    let ops: Vec<serde_json::Value> = state
        .curops
        .list_in_progress()
        .into_iter()
        .map(|op| {
            json!({
                "opid": op.id,
                "client": op.client_id,
                "ns": op.ns,
                "op": op.description,
                "microsecs_running": op.elapsed_ms * 1000,
            })
        })
        .filter(|op| matches_filter(query, op))
        .collect();

    let mut doc = json!({ "inprog": ops });
    if state.is_fsync_locked() {
        doc["fsyncLock"] = json!(true);
        doc["info"] = json!("use db.fsyncUnlock() to terminate the fsync write/snapshot lock");
    }
    DbResponse::single_document(request_id, &Document::new(doc))
}

/// Subset-match predicate over the serialized op view, mirroring the
/// original's `Matcher`/`m->matches(info)` filter in `inProgCmd`. A query
/// containing `$all` (or no query at all) bypasses filtering entirely.
fn matches_filter(query: &Document, op: &serde_json::Value) -> bool {
    let Some(obj) = query.as_object() else { return true };
    if obj.is_empty() || obj.contains_key("$all") {
        return true;
    }
    obj.iter().all(|(k, v)| op.get(k) == Some(v))
}

fn kill_op(state: &ServerState, query: &Document, request_id: i32) -> DbResponse {
    let Some(op_id) = query.get_i64("op") else {
        return DbResponse::single_document(
            request_id,
            &Document::new(json!({"ok": 0, "errmsg": "no op in killOp command object"})),
        );
    };
    state.curops.kill(op_id as u64);
    DbResponse::single_document(request_id, &Document::new(json!({"info": "attempting to kill op"})))
}

fn unlock(state: &ServerState, ns: &Namespace, request_id: i32) -> DbResponse {
    if ns.db != "admin" {
        return DbResponse::single_document(
            request_id,
            &Document::new(json!({"ok": 0, "errmsg": "unlock must be run against the admin database"})),
        );
    }

    let was_locked = state.fsync_locked.swap(false, Ordering::SeqCst);
    let doc = if was_locked {
        json!({"ok": 1, "info": "unlock completed"})
    } else {
        json!({"ok": 0, "errmsg": "not locked"})
    };
    DbResponse::single_document(request_id, &Document::new(doc))
}
