// src/state.rs

use crate::client::Client;
use crate::collaborators::{
    CursorStore, DeleteExecutor, InsertValidator, QueryPlanner, ReplicationPredicates,
    ShardingHook, StorageEngine,
};
use crate::config::Config;
use crate::curop;
use crate::diaglog::DiagLog;
use crate::optime::OpTimeOracle;
use crate::locks::LockManager;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;

/// The collaborator bundle the dispatcher is built against. Kept as a
/// separate struct so tests can swap in `testutil`'s in-memory
/// implementations without reconstructing the rest of `ServerState`.
pub struct Collaborators {
    pub query_planner: Arc<dyn QueryPlanner>,
    pub cursor_store: Arc<dyn CursorStore>,
    pub update_executor: Arc<dyn UpdateExecutor>,
    pub delete_executor: Arc<dyn DeleteExecutor>,
    pub insert_validator: Arc<dyn InsertValidator>,
    pub storage: Arc<dyn StorageEngine>,
    pub sharding: Arc<dyn ShardingHook>,
    pub replication: Arc<dyn ReplicationPredicates>,
}

/// The process-wide shared state every connection handler and the
/// dispatcher itself hold an `Arc` to.
pub struct ServerState {
    pub config: Config,
    pub locks: Arc<LockManager>,
    pub curops: Arc<curop::Registry>,
    pub optime: Arc<OpTimeOracle>,
    pub diaglog: Arc<DiagLog>,
    pub clients: DashMap<u64, Arc<AsyncMutex<Client>>>,
    pub collaborators: Collaborators,
    pub fsync_locked: AtomicBool,
    pub shutting_down: AtomicBool,
}

impl ServerState {
    pub fn new(config: Config, collaborators: Collaborators) -> Arc<Self> {
        let diaglog = Arc::new(DiagLog::new(&config.dbpath));
        let _ = diaglog.set_level(config.diaglog_level);
        Arc::new(ServerState {
            locks: LockManager::new(),
            curops: curop::Registry::new(),
            optime: OpTimeOracle::new(),
            diaglog,
            clients: DashMap::new(),
            collaborators,
            fsync_locked: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            config,
        })
    }

    pub fn register_client(&self, client: Client) -> Arc<AsyncMutex<Client>> {
        let id = client.id;
        let handle = Arc::new(AsyncMutex::new(client));
        self.clients.insert(id, handle.clone());
        handle
    }

    pub fn unregister_client(&self, id: u64) {
        self.clients.remove(&id);
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Relaxed)
    }

    pub fn is_fsync_locked(&self) -> bool {
        self.fsync_locked.load(Ordering::Relaxed)
    }
}
