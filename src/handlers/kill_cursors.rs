// src/handlers/kill_cursors.rs

use crate::errors::DispatchError;
use crate::state::ServerState;
use crate::wire::KillCursorsPayload;
use tracing::warn;

const WARN_THRESHOLD: i32 = 2000;
const HARD_LIMIT: i32 = 30000;

/// `KILL_CURSORS` carries no namespace and never produces a reply, even
/// on a validation failure: every failure here is only ever observable
/// through the last-error slot and the log.
pub async fn handle_kill_cursors(
    state: &ServerState,
    payload: &KillCursorsPayload,
) -> Result<(), DispatchError> {
    let n = payload.cursor_ids.len() as i32;

    if n == 0 {
        return Err(DispatchError::assertion(13341, "must kill at least 1 cursor"));
    }
    if n >= HARD_LIMIT {
        tracing::error!(requested = n, "killCursors: unreasonable cursor count received");
        return Err(DispatchError::assertion(
            13342,
            format!("killCursors: unreasonable cursor count {n} received"),
        ));
    }
    if n > WARN_THRESHOLD {
        warn!(requested = n, "killCursors received a very large cursor list");
    }

    let found = state.collaborators.cursor_store.kill_cursors(&payload.cursor_ids);
    if found as i32 == n {
        tracing::trace!(found, requested = n, "killCursors: all cursors found");
    } else {
        tracing::debug!(found, requested = n, "killCursors: some cursors not found");
    }
    Ok(())
}
