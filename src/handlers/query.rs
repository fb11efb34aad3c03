// src/handlers/query.rs

use crate::client::Client;
use crate::collaborators::ShardDecision;
use crate::errors::DispatchError;
use crate::namespace::Namespace;
use crate::response::DbResponse;
use crate::state::ServerState;
use crate::wire::{query_options, QueryPayload};

pub async fn handle_query(
    state: &ServerState,
    ns: &Namespace,
    request_id: i32,
    payload: &QueryPayload,
    client: &mut Client,
) -> Result<DbResponse, DispatchError> {
    client.op_settings.slave_ok = payload.flags & query_options::SLAVE_OK != 0;

    match state.collaborators.sharding.maybe_redirect_or_reject(ns, client) {
        ShardDecision::Proceed => {}
        ShardDecision::Reject { reason } => return Err(DispatchError::assertion(13388, reason)),
        ShardDecision::Redirect { stale_epoch } => {
            return Err(DispatchError::StaleShardConfig {
                ns: ns.full(),
                message: stale_epoch,
            })
        }
    }

    let result = state
        .collaborators
        .query_planner
        .query(
            ns,
            &payload.query,
            payload.number_to_skip,
            payload.number_to_return,
            payload.return_fields_selector.as_ref(),
        )
        .await?;

    let mut response = DbResponse::reply(request_id, result.cursor_id, 0, &result.documents, 0);
    if result.cursor_id != 0 && payload.flags & query_options::EXHAUST != 0 {
        response = response.with_exhaust(ns.full());
    }
    Ok(response)
}
