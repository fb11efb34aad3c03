// src/handlers/update.rs

use crate::client::{Client, CursorMode};
use crate::collaborators::UpdateOutcome;
use crate::namespace::Namespace;
use crate::response::DbResponse;
use crate::state::ServerState;
use crate::wire::UpdatePayload;

use super::write::{check_writable, in_transaction};

/// Maximum size of an update document, mirroring the original's
/// `BSONObjMaxUserSize` guard (`uassert 10055`).
const MAX_UPDATE_OBJECT_SIZE: usize = 16 * 1024 * 1024;

const UPSERT_FLAG: i32 = 1 << 0;
const MULTI_FLAG: i32 = 1 << 1;
/// Set by a mongos that has already targeted this shard; suppresses the
/// sharding redirect-or-reject hook, mirroring
/// `if (!broadcast && handlePossibleShardedMessage(...))`.
const BROADCAST_FLAG: i32 = 1 << 2;

pub async fn handle_update(
    state: &ServerState,
    ns: &Namespace,
    payload: &UpdatePayload,
    client: &mut Client,
) -> DbResponse {
    let upsert = payload.flags & UPSERT_FLAG != 0;
    let multi = payload.flags & MULTI_FLAG != 0;
    let broadcast = payload.flags & BROADCAST_FLAG != 0;

    if let Err(e) = check_writable(state, ns, client, broadcast) {
        client.last_error.record_error(e.code(), e.to_string());
        return DbResponse::none();
    }

    if payload.update.approx_size() > MAX_UPDATE_OBJECT_SIZE {
        client
            .last_error
            .record_error(10055, "update object too large");
        return DbResponse::none();
    }

    client.op_settings.cursor_mode = CursorMode::WriteLockCursor;

    // Read-lock-first: most updates only touch already-resident documents
    // and never need an exclusive lock at all. Its own transaction bracket,
    // exactly like `lockedReceivedUpdate`'s first invocation.
    let first = in_transaction(state, || async {
        let _read_guard = state.locks.acquire_db_read(&ns.db).await;
        state
            .collaborators
            .update_executor
            .execute(ns, &payload.selector, &payload.update, upsert, multi)
            .await
    })
    .await;

    let outcome = match first {
        Ok(UpdateOutcome::RetryWithWriteLock) => {
            // The locked body is re-entered in full under the write lock:
            // primary/sharding status is re-checked fresh and a new
            // transaction is opened, mirroring `lockedReceivedUpdate` being
            // called a second time with its own `Client::Transaction`.
            if let Err(e) = check_writable(state, ns, client, broadcast) {
                client.last_error.record_error(e.code(), e.to_string());
                return DbResponse::none();
            }
            in_transaction(state, || async {
                let _write_guard = state.locks.acquire_db_write(&ns.db).await;
                state
                    .collaborators
                    .update_executor
                    .execute(ns, &payload.selector, &payload.update, upsert, multi)
                    .await
            })
            .await
        }
        other => other,
    };

    match outcome {
        Ok(UpdateOutcome::Applied { n_matched, updated_existing }) => {
            client.last_error.record_update(n_matched, updated_existing);
        }
        Ok(UpdateOutcome::RetryWithWriteLock) => {
            // The executor asked to retry a second time; treated as a
            // logic error in the collaborator rather than looped forever.
            client
                .last_error
                .record_error(10056, "update executor requested retry twice");
        }
        Err(e) => client.last_error.record_error(e.code(), e.to_string()),
    }

    DbResponse::none()
}
