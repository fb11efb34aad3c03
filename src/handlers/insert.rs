// src/handlers/insert.rs

use crate::client::{Client, CursorMode};
use crate::errors::DispatchError;
use crate::namespace::Namespace;
use crate::response::DbResponse;
use crate::state::ServerState;
use crate::wire::InsertPayload;

use super::write::{check_writable, in_transaction};

/// Tells the batch to keep validating and inserting past a failed
/// document instead of aborting on the first one, mirroring
/// `insertObjects(ns, objs, keepGoing, ...)`.
const CONTINUE_ON_ERROR_FLAG: i32 = 1 << 0;

/// `INSERT` never produces a reply message, per spec; failures are only
/// observable through the last-error slot.
pub async fn handle_insert(
    state: &ServerState,
    ns: &Namespace,
    payload: &InsertPayload,
    client: &mut Client,
) -> DbResponse {
    let keep_going = payload.flags & CONTINUE_ON_ERROR_FLAG != 0;

    if let Err(e) = check_writable(state, ns, client, false) {
        client.last_error.record_error(e.code(), e.to_string());
        return DbResponse::none();
    }

    client.op_settings.cursor_mode = CursorMode::WriteLockCursor;

    let mut valid_docs = Vec::with_capacity(payload.documents.len());
    let mut last_err = None;
    for doc in &payload.documents {
        match state.collaborators.insert_validator.validate(ns, doc) {
            Ok(()) => valid_docs.push(doc.clone()),
            Err(e) => {
                last_err = Some(e);
                if !keep_going {
                    break;
                }
            }
        }
    }

    if let Some(e) = last_err {
        client.last_error.record_error(e.code(), e.to_string());
        if !keep_going {
            return DbResponse::none();
        }
    }

    if valid_docs.is_empty() {
        return DbResponse::none();
    }

    let _guard = state.locks.acquire_db_write(&ns.db).await;

    let result: Result<i64, DispatchError> = in_transaction(state, || async {
        state.collaborators.insert_validator.insert(ns, &valid_docs).await
    })
    .await;

    match result {
        Ok(_n) => {}
        Err(e) => client.last_error.record_error(e.code(), e.to_string()),
    }

    DbResponse::none()
}
