// src/handlers/delete.rs

use crate::client::{Client, CursorMode};
use crate::collaborators::DeleteOutcome;
use crate::namespace::Namespace;
use crate::response::DbResponse;
use crate::state::ServerState;
use crate::wire::DeletePayload;

use super::write::{check_writable, in_transaction};

const JUST_ONE_FLAG: i32 = 1 << 0;
/// Suppresses the sharding redirect-or-reject hook, mirroring
/// `if (!broadcast && handlePossibleShardedMessage(...))`.
const BROADCAST_FLAG: i32 = 1 << 2;

pub async fn handle_delete(
    state: &ServerState,
    ns: &Namespace,
    payload: &DeletePayload,
    client: &mut Client,
) -> DbResponse {
    let just_one = payload.flags & JUST_ONE_FLAG != 0;
    let broadcast = payload.flags & BROADCAST_FLAG != 0;

    if let Err(e) = check_writable(state, ns, client, broadcast) {
        client.last_error.record_error(e.code(), e.to_string());
        return DbResponse::none();
    }

    client.op_settings.cursor_mode = CursorMode::WriteLockCursor;

    let first = in_transaction(state, || async {
        let _read_guard = state.locks.acquire_db_read(&ns.db).await;
        state
            .collaborators
            .delete_executor
            .execute(ns, &payload.selector, just_one)
            .await
    })
    .await;

    let outcome = match first {
        Ok(DeleteOutcome::RetryWithWriteLock) => {
            // Re-run the locked body in full under the write lock, exactly
            // like `lockedReceivedDelete`'s second invocation: fresh
            // primary/sharding check, fresh transaction.
            if let Err(e) = check_writable(state, ns, client, broadcast) {
                client.last_error.record_error(e.code(), e.to_string());
                return DbResponse::none();
            }
            in_transaction(state, || async {
                let _write_guard = state.locks.acquire_db_write(&ns.db).await;
                state
                    .collaborators
                    .delete_executor
                    .execute(ns, &payload.selector, just_one)
                    .await
            })
            .await
        }
        other => other,
    };

    match outcome {
        Ok(DeleteOutcome::Applied { n_removed }) => client.last_error.record_delete(n_removed),
        Ok(DeleteOutcome::RetryWithWriteLock) => client
            .last_error
            .record_error(10056, "delete executor requested retry twice"),
        Err(e) => client.last_error.record_error(e.code(), e.to_string()),
    }

    DbResponse::none()
}
