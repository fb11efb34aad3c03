// src/handlers/write.rs

use crate::client::Client;
use crate::collaborators::ShardDecision;
use crate::errors::DispatchError;
use crate::namespace::Namespace;
use crate::state::ServerState;
use std::future::Future;

/// Per-database authorization, the primary/not-master gate, and the
/// sharding redirect-or-reject hook, run before any lock is taken. Shared
/// by insert, update, and delete. `broadcast` mirrors the wire payload's
/// BROADCAST flag: when set, the sharding hook is skipped entirely,
/// matching the original's `if (!broadcast && handlePossibleShardedMessage(...))`.
/// On a read-lock-first retry under the write lock, callers re-run this
/// in full rather than reusing the first attempt's result.
pub fn check_writable(
    state: &ServerState,
    ns: &Namespace,
    client: &Client,
    broadcast: bool,
) -> Result<(), DispatchError> {
    if !client.auth.authenticated {
        return Err(DispatchError::Unauthorized);
    }
    if !state.collaborators.replication.is_primary_for_namespace(ns) {
        return Err(DispatchError::not_master());
    }
    if broadcast {
        return Ok(());
    }
    match state.collaborators.sharding.maybe_redirect_or_reject(ns, client) {
        ShardDecision::Proceed => Ok(()),
        ShardDecision::Reject { reason } => Err(DispatchError::assertion(13388, reason)),
        ShardDecision::Redirect { stale_epoch } => Err(DispatchError::StaleShardConfig {
            ns: ns.full(),
            message: stale_epoch,
        }),
    }
}

/// Runs `body` wrapped in a begin/commit/abort bracket on the storage
/// engine, exactly once regardless of which branch `body` takes -
/// mirroring the original's `Client::Transaction(DB_SERIALIZABLE)` scope
/// around each write executor call.
pub async fn in_transaction<T, F, Fut>(state: &ServerState, body: F) -> Result<T, DispatchError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, DispatchError>>,
{
    let tx = state.collaborators.storage.begin().await?;
    match body().await {
        Ok(value) => {
            state.collaborators.storage.commit(tx).await?;
            Ok(value)
        }
        Err(e) => {
            let _ = state.collaborators.storage.abort(tx).await;
            Err(e)
        }
    }
}
