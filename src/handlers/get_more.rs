// src/handlers/get_more.rs

use crate::client::Client;
use crate::curop::CurOp;
use crate::errors::DispatchError;
use crate::metrics::GETMORE_WAITS_TOTAL;
use crate::namespace::Namespace;
use crate::response::DbResponse;
use crate::state::ServerState;
use crate::wire::{response_flags, GetMorePayload};
use std::sync::Arc;
use std::time::Instant;

/// Attempts a single non-blocking get-more call under a freshly-acquired
/// read lock. The lock is dropped before returning in every case, since
/// callers may go on to wait on it.
async fn try_once(
    state: &ServerState,
    ns: &Namespace,
    cursor_id: i64,
    batch_size: i32,
    client: &Client,
) -> Result<Option<crate::collaborators::GetMoreResult>, DispatchError> {
    let _guard = state.locks.acquire_db_read(&ns.db).await;

    // replVerifyReadsOk(): a non-primary only serves this read if the
    // cursor's originating query asked for it.
    if !client.op_settings.slave_ok && !state.collaborators.replication.is_primary_for_namespace(ns) {
        return Err(DispatchError::not_master());
    }

    state
        .collaborators
        .cursor_store
        .get_more(cursor_id, batch_size)
        .await
}

/// The oplog-tailing path: pass 0 captures the lowest commit id every
/// replica-set member has applied, then makes one immediate attempt. If
/// that attempt comes back empty, pass 1 waits (without holding any
/// lock) for that commit id to move before trying exactly once more.
async fn get_more_oplog(
    state: &ServerState,
    ns: &Namespace,
    cursor_id: i64,
    batch_size: i32,
    curop: &Arc<CurOp>,
    client: &Client,
) -> Result<Option<crate::collaborators::GetMoreResult>, DispatchError> {
    let min_live = state.collaborators.replication.min_live_commit_id();

    if let Some(result) = try_once(state, ns, cursor_id, batch_size, client).await? {
        if !result.documents.is_empty() || result.cursor_id == 0 {
            return Ok(Some(result));
        }
    } else {
        return Ok(None);
    }

    if curop.is_interrupted() {
        return Err(DispatchError::Interrupted);
    }

    GETMORE_WAITS_TOTAL.inc();
    state
        .optime
        .wait_for_advance(min_live, state.config.oplog_wait_timeout())
        .await;

    try_once(state, ns, cursor_id, batch_size, client).await
}

/// The non-oplog path: poll on a short interval (2ms in production,
/// usually raised in debug/test configurations) until either the cursor
/// produces data or an overall timeout elapses, in which case an empty
/// batch is returned with the cursor left alive (the client is expected
/// to be in `AWAIT_DATA` mode).
async fn get_more_poll(
    state: &ServerState,
    ns: &Namespace,
    cursor_id: i64,
    batch_size: i32,
    curop: &Arc<CurOp>,
    client: &Client,
) -> Result<Option<crate::collaborators::GetMoreResult>, DispatchError> {
    let deadline = Instant::now() + state.config.getmore_overall_timeout();
    loop {
        let attempt = try_once(state, ns, cursor_id, batch_size, client).await?;
        let Some(result) = attempt else {
            return Ok(None);
        };
        if !result.documents.is_empty() || result.cursor_id == 0 {
            return Ok(Some(result));
        }
        if curop.is_interrupted() {
            return Err(DispatchError::Interrupted);
        }
        if Instant::now() >= deadline {
            return Ok(Some(result));
        }
        tokio::time::sleep(state.config.getmore_poll_interval()).await;
    }
}

pub async fn handle_get_more(
    state: &ServerState,
    ns: &Namespace,
    request_id: i32,
    payload: &GetMorePayload,
    curop: &Arc<CurOp>,
    client: &Client,
) -> Result<DbResponse, DispatchError> {
    let outcome = if ns.is_replicated_log() {
        get_more_oplog(state, ns, payload.cursor_id, payload.number_to_return, curop, client).await
    } else {
        get_more_poll(state, ns, payload.cursor_id, payload.number_to_return, curop, client).await
    };

    match outcome {
        Ok(Some(result)) => {
            let flags = if result.cursor_id != 0 {
                response_flags::AWAIT_CAPABLE
            } else {
                0
            };
            if result.documents.is_empty() && result.cursor_id != 0 {
                // Timed out waiting for data with the cursor still alive;
                // force this onto the slow-op log even if it came back fast.
                curop.mark_force_log();
            }
            Ok(DbResponse::reply(request_id, result.cursor_id, 0, &result.documents, flags))
        }
        Ok(None) => Ok(DbResponse::cursor_not_found(request_id)),
        // A cursor interruption is reported back to the client as an empty,
        // still-alive batch rather than a hard error, matching the
        // original's code-13436 special case in `receivedGetMore`.
        Err(DispatchError::Interrupted) => Ok(DbResponse::reply(
            request_id,
            payload.cursor_id,
            0,
            &[],
            response_flags::AWAIT_CAPABLE,
        )),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client as RawClient;
    use crate::collaborators::{InsertValidator, ReplicationPredicates, ShardDecision, ShardingHook};
    use crate::config::Config;
    use crate::document::Document;
    use crate::optime::OpTime;
    use crate::state::{Collaborators, ServerState};
    use crate::testutil::InMemoryStore;
    use crate::wire::GetMorePayload;
    use serde_json::json;

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

    async fn state_with_a_live_cursor() -> (Arc<ServerState>, Namespace, i64) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.dbpath = dir.path().to_path_buf();

        let store = InMemoryStore::new();
        let ns = Namespace::parse("test.widgets").unwrap();
        for i in 0..5 {
            store.insert(&ns, &[crate::document::Document::new(json!({"_id": i}))]).await.unwrap();
        }

        let topology = Arc::new(NeverPrimary);
        let collaborators = Collaborators {
            query_planner: store.clone(),
            cursor_store: store.clone(),
            update_executor: store.clone(),
            delete_executor: store.clone(),
            insert_validator: store.clone(),
            storage: store.clone(),
            sharding: topology.clone(),
            replication: topology,
        };
        let state = ServerState::new(config, collaborators);

        // Opening a query isn't gated on primary status; only get-more's
        // read-permission check is. Batch size 2 against 5 documents
        // leaves a live cursor behind for get-more to act on.
        let result = store.query(&ns, &Document::new(json!({})), 0, 2, None).await.unwrap();
        assert_ne!(result.cursor_id, 0);
        (state, ns, result.cursor_id)
    }

    #[tokio::test]
    async fn get_more_on_a_secondary_without_slave_ok_is_rejected() {
        let (state, ns, cursor_id) = state_with_a_live_cursor().await;
        let registry = crate::curop::Registry::new();
        let curop = registry.start(1, "getmore", Some(ns.full()));
        let client = RawClient::new("127.0.0.1:9100".parse().unwrap());
        let payload = GetMorePayload {
            full_collection_name: ns.full(),
            number_to_return: 2,
            cursor_id,
        };

        let result = handle_get_more(&state, &ns, 1, &payload, &curop, &client).await;
        assert!(matches!(result, Err(DispatchError::NotMaster)));
    }

    #[tokio::test]
    async fn get_more_on_a_secondary_with_slave_ok_proceeds() {
        let (state, ns, cursor_id) = state_with_a_live_cursor().await;
        let registry = crate::curop::Registry::new();
        let curop = registry.start(1, "getmore", Some(ns.full()));
        let mut client = RawClient::new("127.0.0.1:9101".parse().unwrap());
        client.op_settings.slave_ok = true;
        let payload = GetMorePayload {
            full_collection_name: ns.full(),
            number_to_return: 2,
            cursor_id,
        };

        let response = handle_get_more(&state, &ns, 1, &payload, &curop, &client)
            .await
            .expect("slave_ok permits the read on a secondary");
        let reply = response.message.expect("a successful get-more still replies");
        let n_returned = i32::from_le_bytes(reply.body[16..20].try_into().unwrap());
        assert!(n_returned > 0);
    }
}
