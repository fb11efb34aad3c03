// src/collaborators.rs

//! Call contracts for the components this crate treats as external
//! collaborators: the query planner, update/delete executors, insert
//! validator, storage engine, sharding router, and replication topology.
//! Only `src/testutil.rs` implements these, for the integration tests.

use crate::client::Client;
use crate::document::Document;
use crate::errors::DispatchError;
use crate::namespace::Namespace;
use crate::optime::OpTime;
use async_trait::async_trait;

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub documents: Vec<Document>,
    /// Zero if the result set was exhausted in the first batch.
    pub cursor_id: i64,
}

#[derive(Debug, Clone)]
pub struct GetMoreResult {
    pub documents: Vec<Document>,
    /// Zero once the cursor is exhausted.
    pub cursor_id: i64,
}

/// Evaluates `QUERY` requests and produces the first batch plus an
/// optional cursor for subsequent `GET_MORE`s.
#[async_trait]
pub trait QueryPlanner: Send + Sync {
    async fn query(
        &self,
        ns: &Namespace,
        query: &Document,
        skip: i32,
        limit: i32,
        fields: Option<&Document>,
    ) -> Result<QueryResult, DispatchError>;
}

/// Advances and tears down cursors already opened by a `QueryPlanner`.
/// Split out from `QueryPlanner` because get-more and kill-cursors need
/// no knowledge of how a cursor was produced, only that it exists.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn get_more(&self, cursor_id: i64, batch_size: i32) -> Result<Option<GetMoreResult>, DispatchError>;

    /// Removes the given cursor ids, returning how many were actually
    /// found and erased.
    fn kill_cursors(&self, cursor_ids: &[i64]) -> usize;
}

pub enum UpdateOutcome {
    Applied { n_matched: i64, updated_existing: bool },
    /// Signals that a write under a shared read lock discovered it needs
    /// to mutate state; the caller retries once under a write lock. This
    /// is a plain return value, not an exception.
    RetryWithWriteLock,
}

#[async_trait]
pub trait UpdateExecutor: Send + Sync {
    async fn execute(
        &self,
        ns: &Namespace,
        selector: &Document,
        update: &Document,
        upsert: bool,
        multi: bool,
    ) -> Result<UpdateOutcome, DispatchError>;
}

pub enum DeleteOutcome {
    Applied { n_removed: i64 },
    RetryWithWriteLock,
}

#[async_trait]
pub trait DeleteExecutor: Send + Sync {
    async fn execute(
        &self,
        ns: &Namespace,
        selector: &Document,
        just_one: bool,
    ) -> Result<DeleteOutcome, DispatchError>;
}

/// Validates and persists a batch of inserted documents. Validation is a
/// synchronous, side-effect-free check (size limits, required fields);
/// the actual write goes through the storage engine's transaction
/// bracket, same as update/delete.
#[async_trait]
pub trait InsertValidator: Send + Sync {
    fn validate(&self, ns: &Namespace, doc: &Document) -> Result<(), DispatchError>;

    async fn insert(&self, ns: &Namespace, documents: &[Document]) -> Result<i64, DispatchError>;
}

/// A handle to an in-flight storage transaction. Opaque to this crate;
/// only used to pair a `commit`/`abort` call with the `begin` that opened
/// it.
pub struct TransactionHandle(pub u64);

#[async_trait]
pub trait StorageEngine: Send + Sync {
    async fn begin(&self) -> Result<TransactionHandle, DispatchError>;
    async fn commit(&self, tx: TransactionHandle) -> Result<(), DispatchError>;
    async fn abort(&self, tx: TransactionHandle) -> Result<(), DispatchError>;
}

pub enum ShardDecision {
    Proceed,
    Reject { reason: String },
    Redirect { stale_epoch: String },
}

/// Decides whether a request belongs on this node at all. Spec.md treats
/// the sharding router as an external collaborator; this hook is the
/// entirety of what the dispatcher consumes from it.
pub trait ShardingHook: Send + Sync {
    fn maybe_redirect_or_reject(&self, ns: &Namespace, client: &Client) -> ShardDecision;
}

/// The two predicates the dispatcher needs from replication topology:
/// whether this node may accept writes for a namespace, and the lowest
/// commit id visible to every member (consumed by the get-more
/// oplog-tailing path).
pub trait ReplicationPredicates: Send + Sync {
    fn is_primary_for_namespace(&self, ns: &Namespace) -> bool;
    fn min_live_commit_id(&self) -> OpTime;
}
