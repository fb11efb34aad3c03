// src/errors.rs

//! Defines the primary error type for the dispatch core.

use std::sync::Arc;
use thiserror::Error;

/// The error kinds of the dispatch contract. Every caller-induced error the
/// dispatcher can observe is one of these; `Fatal` is the only kind that is
/// not contained within `assemble_response`.
#[derive(Error, Debug, Clone)]
pub enum DispatchError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("assertion {code}: {message}")]
    UserError { code: i32, message: String },

    #[error("assertion {code}: {message}")]
    Assertion { code: i32, message: String },

    #[error("SendStaleConfig ns={ns}: {message}")]
    StaleShardConfig { ns: String, message: String },

    #[error("interrupted at client's request")]
    Interrupted,

    #[error("not master")]
    NotMaster,

    #[error("unauthorized")]
    Unauthorized,

    #[error("invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("shutting down")]
    ShuttingDown,

    #[error("fatal: {0}")]
    Fatal(String),
}

impl DispatchError {
    /// The numeric code surfaced to callers, mirroring the hand-picked
    /// assertion codes the original dispatch core used (e.g. 10054 for "not
    /// master" on update, 16257 for an invalid namespace on insert).
    pub fn code(&self) -> i32 {
        match self {
            DispatchError::Io(_) => 10007,
            DispatchError::UserError { code, .. } => *code,
            DispatchError::Assertion { code, .. } => *code,
            DispatchError::StaleShardConfig { .. } => 13388,
            DispatchError::Interrupted => 13436,
            DispatchError::NotMaster => 10054,
            DispatchError::Unauthorized => 10057,
            DispatchError::InvalidNamespace(_) => 16257,
            DispatchError::ShuttingDown => 13073,
            DispatchError::Fatal(_) => 1,
        }
    }

    pub fn not_master() -> Self {
        DispatchError::NotMaster
    }

    pub fn invalid_namespace(ns: impl Into<String>) -> Self {
        DispatchError::InvalidNamespace(ns.into())
    }

    pub fn assertion(code: i32, message: impl Into<String>) -> Self {
        DispatchError::Assertion {
            code,
            message: message.into(),
        }
    }

    pub fn user(code: i32, message: impl Into<String>) -> Self {
        DispatchError::UserError {
            code,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(e: std::io::Error) -> Self {
        DispatchError::Io(Arc::new(e))
    }
}
