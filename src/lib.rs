// src/lib.rs

//! The request dispatch core of a document-oriented database server:
//! wire decoding, request classification, locking, the write-path
//! transaction bracket, long-polling get-more, and the admin
//! sub-dispatcher. The query planner, executors, storage engine,
//! replication, and sharding are external collaborators, specified here
//! only as traits in [`collaborators`].

pub mod client;
pub mod collaborators;
pub mod config;
pub mod connection;
pub mod curop;
pub mod diaglog;
pub mod direct_client;
pub mod dispatch;
pub mod document;
pub mod errors;
pub mod handlers;
pub mod lasterror;
pub mod locks;
pub mod metrics;
pub mod namespace;
pub mod optime;
pub mod response;
pub mod server;
pub mod shutdown;
pub mod state;
pub mod wire;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use dispatch::Dispatcher;
pub use errors::DispatchError;
pub use state::ServerState;
