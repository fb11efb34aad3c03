// src/testutil.rs

//! In-memory reference implementations of every collaborator trait, used
//! only by this crate's own test suite and by integration tests in
//! `tests/` (behind the `testutil` feature).

use crate::client::Client;
use crate::collaborators::{
    Collaborators, CursorStore, DeleteExecutor, DeleteOutcome, GetMoreResult, InsertValidator,
    QueryPlanner, QueryResult, ReplicationPredicates, ShardDecision, ShardingHook, StorageEngine,
    TransactionHandle, UpdateExecutor, UpdateOutcome,
};
use crate::document::Document;
use crate::errors::DispatchError;
use crate::namespace::Namespace;
use crate::optime::OpTime;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// A single-process collection store: `full namespace -> documents`, with
/// a linear scan matching a selector by top-level key equality. Good
/// enough to exercise the dispatch core; nowhere near a real query
/// engine.
#[derive(Default)]
pub struct InMemoryStore {
    collections: DashMap<String, Vec<Document>>,
    cursors: DashMap<i64, VecDeque<Document>>,
    next_cursor_id: AtomicI64,
    next_tx_id: AtomicU64,
    batch_size: usize,
}

impl InMemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(InMemoryStore {
            collections: DashMap::new(),
            cursors: DashMap::new(),
            next_cursor_id: AtomicI64::new(1),
            next_tx_id: AtomicU64::new(1),
            batch_size: 2,
        })
    }

    fn matches(selector: &Document, doc: &Document) -> bool {
        let Some(obj) = selector.as_object() else { return true };
        if obj.is_empty() {
            return true;
        }
        obj.iter().all(|(k, v)| doc.get(k) == Some(v))
    }
}

#[async_trait]
impl QueryPlanner for InMemoryStore {
    async fn query(
        &self,
        ns: &Namespace,
        query: &Document,
        skip: i32,
        limit: i32,
        _fields: Option<&Document>,
    ) -> Result<QueryResult, DispatchError> {
        let docs = self
            .collections
            .get(&ns.full())
            .map(|c| c.clone())
            .unwrap_or_default();

        let mut matched: VecDeque<Document> = docs
            .into_iter()
            .filter(|d| Self::matches(query, d))
            .skip(skip.max(0) as usize)
            .collect();
        if limit > 0 {
            matched.truncate(limit as usize);
        }

        let batch: Vec<Document> = matched.drain(..matched.len().min(self.batch_size)).collect();
        if matched.is_empty() {
            return Ok(QueryResult { documents: batch, cursor_id: 0 });
        }

        let cursor_id = self.next_cursor_id.fetch_add(1, Ordering::Relaxed);
        self.cursors.insert(cursor_id, matched);
        Ok(QueryResult { documents: batch, cursor_id })
    }
}

#[async_trait]
impl CursorStore for InMemoryStore {
    async fn get_more(&self, cursor_id: i64, batch_size: i32) -> Result<Option<GetMoreResult>, DispatchError> {
        let Some(mut entry) = self.cursors.get_mut(&cursor_id) else {
            return Ok(None);
        };
        let n = if batch_size > 0 { batch_size as usize } else { self.batch_size };
        let batch: Vec<Document> = entry.drain(..entry.len().min(n)).collect();
        let exhausted = entry.is_empty();
        drop(entry);
        if exhausted {
            self.cursors.remove(&cursor_id);
        }
        Ok(Some(GetMoreResult {
            documents: batch,
            cursor_id: if exhausted { 0 } else { cursor_id },
        }))
    }

    fn kill_cursors(&self, cursor_ids: &[i64]) -> usize {
        cursor_ids.iter().filter(|id| self.cursors.remove(id).is_some()).count()
    }
}

#[async_trait]
impl UpdateExecutor for InMemoryStore {
    async fn execute(
        &self,
        ns: &Namespace,
        selector: &Document,
        update: &Document,
        upsert: bool,
        multi: bool,
    ) -> Result<UpdateOutcome, DispatchError> {
        let mut collection = self.collections.entry(ns.full()).or_default();
        let mut n_matched = 0i64;
        for doc in collection.iter_mut() {
            if Self::matches(selector, doc) {
                *doc = update.clone();
                n_matched += 1;
                if !multi {
                    break;
                }
            }
        }
        if n_matched == 0 && upsert {
            collection.push(update.clone());
            return Ok(UpdateOutcome::Applied { n_matched: 1, updated_existing: false });
        }
        Ok(UpdateOutcome::Applied { n_matched, updated_existing: n_matched > 0 })
    }
}

#[async_trait]
impl DeleteExecutor for InMemoryStore {
    async fn execute(
        &self,
        ns: &Namespace,
        selector: &Document,
        just_one: bool,
    ) -> Result<DeleteOutcome, DispatchError> {
        let mut collection = self.collections.entry(ns.full()).or_default();
        let before = collection.len();
        if just_one {
            if let Some(pos) = collection.iter().position(|d| Self::matches(selector, d)) {
                collection.remove(pos);
            }
        } else {
            collection.retain(|d| !Self::matches(selector, d));
        }
        let removed = (before - collection.len()) as i64;
        Ok(DeleteOutcome::Applied { n_removed: removed })
    }
}

#[async_trait]
impl InsertValidator for InMemoryStore {
    fn validate(&self, _ns: &Namespace, doc: &Document) -> Result<(), DispatchError> {
        if doc.approx_size() > 16 * 1024 * 1024 {
            return Err(DispatchError::assertion(10059, "document too large"));
        }
        Ok(())
    }

    async fn insert(&self, ns: &Namespace, documents: &[Document]) -> Result<i64, DispatchError> {
        let mut collection = self.collections.entry(ns.full()).or_default();
        collection.extend_from_slice(documents);
        Ok(documents.len() as i64)
    }
}

#[async_trait]
impl StorageEngine for InMemoryStore {
    async fn begin(&self) -> Result<TransactionHandle, DispatchError> {
        Ok(TransactionHandle(self.next_tx_id.fetch_add(1, Ordering::Relaxed)))
    }

    async fn commit(&self, _tx: TransactionHandle) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn abort(&self, _tx: TransactionHandle) -> Result<(), DispatchError> {
        Ok(())
    }
}

pub struct AlwaysPrimary;

impl ShardingHook for AlwaysPrimary {
    fn maybe_redirect_or_reject(&self, _ns: &Namespace, _client: &Client) -> ShardDecision {
        ShardDecision::Proceed
    }
}

impl ReplicationPredicates for AlwaysPrimary {
    fn is_primary_for_namespace(&self, _ns: &Namespace) -> bool {
        true
    }

    fn min_live_commit_id(&self) -> OpTime {
        OpTime::default()
    }
}

/// Builds a `Collaborators` bundle backed entirely by the in-memory
/// reference implementations above.
pub fn in_memory_collaborators() -> Collaborators {
    let store = InMemoryStore::new();
    let topology = Arc::new(AlwaysPrimary);
    Collaborators {
        query_planner: store.clone(),
        cursor_store: store.clone(),
        update_executor: store.clone(),
        delete_executor: store.clone(),
        insert_validator: store.clone(),
        storage: store,
        sharding: topology.clone(),
        replication: topology,
    }
}
