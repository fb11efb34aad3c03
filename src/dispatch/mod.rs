// src/dispatch/mod.rs

mod admin;

use crate::client::Client;
use crate::diaglog::RateLimiter;
use crate::document::Document;
use crate::errors::DispatchError;
use crate::handlers;
use crate::metrics::{COMMANDS_PROCESSED_TOTAL, CURRENT_OP_COUNT, SLOW_OPS_TOTAL};
use crate::namespace::Namespace;
use crate::response::DbResponse;
use crate::state::ServerState;
use crate::wire::{
    response_flags, DeletePayload, GetMorePayload, InsertPayload, KillCursorsPayload, Message,
    Opcode, QueryPayload, UpdatePayload,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info_span, Instrument};

/// `KILL_CURSORS` never legitimately touches storage, so it gets a much
/// tighter slow-op threshold than the configured default.
const KILL_CURSORS_SLOW_MS: i64 = 10;

/// Dispatches a single inbound message to the right handler and returns
/// whatever should go back on the wire (nothing, for writes). This is
/// the crate's single entry point, the direct analogue of the original
/// `assembleResponse`.
pub struct Dispatcher {
    state: Arc<ServerState>,
    unsupported_opcode_limiter: RateLimiter,
}

impl Dispatcher {
    pub fn new(state: Arc<ServerState>) -> Self {
        Dispatcher {
            state,
            unsupported_opcode_limiter: RateLimiter::new(),
        }
    }

    pub async fn assemble_response(
        &self,
        message: Message,
        client: &Arc<AsyncMutex<Client>>,
    ) -> DbResponse {
        let request_id = message.header.request_id;

        let Some(opcode) = message.opcode() else {
            if self.unsupported_opcode_limiter.should_log() {
                tracing::warn!(code = message.header.opcode, "dispatcher: unrecognized opcode");
            }
            return DbResponse::none();
        };

        // Diag-log side-channel, unconditionally, before anything else -
        // including the admin short-circuit below - exactly like the
        // original's opwrite(m)/opread(m) ahead of the $cmd.sys.* test.
        // QUERY against a non-command namespace, and GET_MORE, are the
        // only read-recorded opcodes; everything else (including
        // KILL_CURSORS, MSG, and QUERY-as-command) is write-recorded.
        let is_read_op = match opcode {
            Opcode::Query => QueryPayload::parse(&message.body)
                .ok()
                .and_then(|p| Namespace::parse(&p.full_collection_name).ok())
                .map(|ns| !ns.is_command())
                .unwrap_or(true),
            Opcode::GetMore => true,
            _ => false,
        };
        if is_read_op {
            self.state.diaglog.log_read_op(&message.body, false);
        } else {
            self.state.diaglog.log_write_op(&message.body);
        }

        // Admin pseudo-commands short-circuit before any CurOp exists,
        // exactly like the original's inProgCmd/killOp/unlockFsync.
        if opcode == Opcode::Query {
            if let Ok(payload) = QueryPayload::parse(&message.body) {
                if let Ok(ns) = Namespace::parse(&payload.full_collection_name) {
                    if let Some(admin_cmd) = ns.admin_pseudo_command() {
                        let guard = client.lock().await;
                        return admin::dispatch(&self.state, admin_cmd, &ns, &payload.query, &guard, request_id);
                    }
                }
            }
        }

        let client_id = {
            let mut guard = client.lock().await;
            guard.begin_request();
            guard.id
        };

        COMMANDS_PROCESSED_TOTAL
            .with_label_values(&[opcode_label(opcode)])
            .inc();

        let ns = parse_namespace_for(opcode, &message.body);
        let description = opcode_label(opcode).to_string();
        let curop = self
            .state
            .curops
            .start(client_id, description, ns.as_ref().map(Namespace::full));
        CURRENT_OP_COUNT.set(self.state.curops.active_count() as i64);

        let ns_string = ns.as_ref().map(Namespace::full);
        let span = info_span!("command", opcode = opcode_label(opcode), ns = ?ns_string);
        let response = self
            .route(opcode, &message, ns.as_ref(), request_id, client, &curop)
            .instrument(span)
            .await;

        let elapsed_ms = curop.elapsed_ms();
        self.state.curops.finish(client_id, &curop);

        // KILL_CURSORS gets a much tighter slow-op threshold than
        // everything else, since it should never legitimately touch disk.
        let slow_threshold_ms = if opcode == Opcode::KillCursors {
            KILL_CURSORS_SLOW_MS
        } else {
            self.state.config.slow_ms + curop.expected_latency_adjustment_ms()
        };
        if elapsed_ms >= slow_threshold_ms || curop.should_force_log() {
            SLOW_OPS_TOTAL.inc();
            tracing::info!(
                opcode = opcode_label(opcode),
                elapsed_ms,
                debug_info = ?curop.debug_info(),
                "slow operation"
            );
        }

        if let Some(ns) = ns.as_ref() {
            self.maybe_profile(ns, opcode_label(opcode), elapsed_ms).await;
        }

        response
    }

    /// Appends a profile document to `<db>.system.profile` when the
    /// configured profiling level calls for it. Never run while the
    /// handler's own locks are still held, and skipped entirely under the
    /// fsync lock.
    async fn maybe_profile(&self, ns: &Namespace, op: &str, elapsed_ms: i64) {
        let should_profile = match self.state.config.profiling_level {
            2 => true,
            1 => elapsed_ms >= self.state.config.profiling_threshold_ms,
            _ => false,
        };
        if !should_profile || self.state.is_fsync_locked() {
            return;
        }

        let profile_ns = Namespace {
            db: ns.db.clone(),
            collection: "system.profile".to_string(),
        };
        let doc = crate::document::Document::new(json!({
            "ns": ns.full(),
            "op": op,
            "millis": elapsed_ms,
        }));

        let _guard = self.state.locks.acquire_db_write(&profile_ns.db).await;
        let result = handlers::in_transaction(&self.state, || async {
            self.state
                .collaborators
                .insert_validator
                .insert(&profile_ns, std::slice::from_ref(&doc))
                .await
        })
        .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "profiling: failed to append profile document");
        }
    }

    async fn route(
        &self,
        opcode: Opcode,
        message: &Message,
        ns: Option<&Namespace>,
        request_id: i32,
        client: &Arc<AsyncMutex<Client>>,
        curop: &Arc<crate::curop::CurOp>,
    ) -> DbResponse {
        let result: Result<DbResponse, DispatchError> = match opcode {
            Opcode::Query => self.handle_query(message, request_id, client).await,
            Opcode::GetMore => self.handle_get_more(message, ns, request_id, curop, client).await,
            Opcode::Insert => self.handle_insert(message, ns, client).await,
            Opcode::Update => self.handle_update(message, ns, client).await,
            Opcode::Delete => self.handle_delete(message, ns, client).await,
            Opcode::KillCursors => self.handle_kill_cursors(message).await,
            Opcode::Msg => Ok(self.handle_msg(message, request_id)),
            Opcode::Reply => {
                if self.unsupported_opcode_limiter.should_log() {
                    tracing::warn!("dispatcher: received a REPLY opcode from a client");
                }
                Ok(DbResponse::none())
            }
        };

        // Exception isolation: a caught error is recorded on the op and
        // never allowed past this point. A system-level assertion also
        // forces the slow-op log line regardless of how fast it was.
        // `Fatal` is the one kind that is not contained here: a
        // collaborator reporting a genuinely unrecoverable condition
        // takes the process down rather than surfacing as a reply.
        if let Err(e) = &result {
            if let DispatchError::Fatal(msg) = e {
                crate::shutdown::abort(msg);
            }
            curop.set_debug_info(e.to_string());
            if matches!(e, DispatchError::Assertion { .. }) {
                curop.mark_force_log();
            }
        }

        // INSERT/UPDATE/DELETE are fire-and-forget by design; KILL_CURSORS
        // never replies either, even when validation fails (a bad cursor
        // count is only ever observable through the log, per S2).
        let discards_reply = opcode.is_write() || opcode == Opcode::KillCursors;
        match (discards_reply, result) {
            (true, _) => DbResponse::none(),
            (false, Ok(response)) => response,
            (false, Err(e)) => {
                let extra = match &e {
                    DispatchError::StaleShardConfig { .. } => response_flags::SHARD_CONFIG_STALE,
                    _ => 0,
                };
                let doc = Document::new(json!({"$err": e.to_string(), "code": e.code()}));
                DbResponse::error(request_id, &doc, extra)
            }
        }
    }

    async fn handle_query(
        &self,
        message: &Message,
        request_id: i32,
        client: &Arc<AsyncMutex<Client>>,
    ) -> Result<DbResponse, DispatchError> {
        let payload = QueryPayload::parse(&message.body)?;
        let ns = Namespace::parse(&payload.full_collection_name)?;
        let mut guard = client.lock().await;
        handlers::handle_query(&self.state, &ns, request_id, &payload, &mut guard).await
    }

    async fn handle_get_more(
        &self,
        message: &Message,
        ns: Option<&Namespace>,
        request_id: i32,
        curop: &Arc<crate::curop::CurOp>,
        client: &Arc<AsyncMutex<Client>>,
    ) -> Result<DbResponse, DispatchError> {
        let payload = GetMorePayload::parse(&message.body)?;
        let ns = ns.cloned().ok_or_else(|| DispatchError::invalid_namespace(payload.full_collection_name.clone()))?;
        let guard = client.lock().await;
        handlers::handle_get_more(&self.state, &ns, request_id, &payload, curop, &guard).await
    }

    async fn handle_insert(
        &self,
        message: &Message,
        ns: Option<&Namespace>,
        client: &Arc<AsyncMutex<Client>>,
    ) -> Result<DbResponse, DispatchError> {
        let payload = match InsertPayload::parse(&message.body) {
            Ok(payload) => payload,
            Err(e) => return record_write_failure(client, e).await,
        };
        let ns = match ns.cloned() {
            Some(ns) => ns,
            None => return record_write_failure(client, DispatchError::invalid_namespace(payload.full_collection_name)).await,
        };
        let mut guard = client.lock().await;
        Ok(handlers::handle_insert(&self.state, &ns, &payload, &mut guard).await)
    }

    async fn handle_update(
        &self,
        message: &Message,
        ns: Option<&Namespace>,
        client: &Arc<AsyncMutex<Client>>,
    ) -> Result<DbResponse, DispatchError> {
        let payload = match UpdatePayload::parse(&message.body) {
            Ok(payload) => payload,
            Err(e) => return record_write_failure(client, e).await,
        };
        let ns = match ns.cloned() {
            Some(ns) => ns,
            None => return record_write_failure(client, DispatchError::invalid_namespace(payload.full_collection_name)).await,
        };
        let mut guard = client.lock().await;
        Ok(handlers::handle_update(&self.state, &ns, &payload, &mut guard).await)
    }

    async fn handle_delete(
        &self,
        message: &Message,
        ns: Option<&Namespace>,
        client: &Arc<AsyncMutex<Client>>,
    ) -> Result<DbResponse, DispatchError> {
        let payload = match DeletePayload::parse(&message.body) {
            Ok(payload) => payload,
            Err(e) => return record_write_failure(client, e).await,
        };
        let ns = match ns.cloned() {
            Some(ns) => ns,
            None => return record_write_failure(client, DispatchError::invalid_namespace(payload.full_collection_name)).await,
        };
        let mut guard = client.lock().await;
        Ok(handlers::handle_delete(&self.state, &ns, &payload, &mut guard).await)
    }

    async fn handle_kill_cursors(&self, message: &Message) -> Result<DbResponse, DispatchError> {
        let payload = KillCursorsPayload::parse(&message.body)?;
        handlers::handle_kill_cursors(&self.state, &payload).await?;
        Ok(DbResponse::none())
    }

    /// `MSG` has been deprecated since before this crate's lineage began.
    /// The one behavior preserved from the original is the literal `"end"`
    /// payload special case; every other body gets a generic deprecation
    /// notice.
    fn handle_msg(&self, message: &Message, request_id: i32) -> DbResponse {
        if self.unsupported_opcode_limiter.should_log() {
            tracing::info!("dispatcher: MSG opcode is deprecated");
        }
        let body = String::from_utf8_lossy(&message.body);
        let text = body.trim_end_matches('\0');
        let reply = if text == "end" {
            "dbMsg: end no longer supported"
        } else {
            "dbMsg: opcode is deprecated, no support for input replies"
        };
        DbResponse::single_document(request_id, &Document::new(json!({"msg": reply})))
    }
}

/// `INSERT`/`UPDATE`/`DELETE` never reply; a parse or namespace failure
/// caught here, before the handler itself runs, would otherwise vanish
/// silently. Recording it on the last-error slot keeps it observable the
/// same way the handlers' own failures are.
async fn record_write_failure(
    client: &Arc<AsyncMutex<Client>>,
    error: DispatchError,
) -> Result<DbResponse, DispatchError> {
    let mut guard = client.lock().await;
    guard.last_error.record_error(error.code(), error.to_string());
    Ok(DbResponse::none())
}

fn parse_namespace_for(opcode: Opcode, body: &[u8]) -> Option<Namespace> {
    let full_collection_name = match opcode {
        Opcode::Query => QueryPayload::parse(body).ok()?.full_collection_name,
        Opcode::GetMore => GetMorePayload::parse(body).ok()?.full_collection_name,
        Opcode::Insert => InsertPayload::parse(body).ok()?.full_collection_name,
        Opcode::Update => UpdatePayload::parse(body).ok()?.full_collection_name,
        Opcode::Delete => DeletePayload::parse(body).ok()?.full_collection_name,
        Opcode::KillCursors | Opcode::Msg | Opcode::Reply => return None,
    };
    Namespace::parse(&full_collection_name).ok()
}

fn opcode_label(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::Reply => "reply",
        Opcode::Msg => "msg",
        Opcode::Update => "update",
        Opcode::Insert => "insert",
        Opcode::Query => "query",
        Opcode::GetMore => "getmore",
        Opcode::Delete => "delete",
        Opcode::KillCursors => "killcursors",
    }
}
