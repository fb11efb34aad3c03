// src/namespace.rs

use crate::errors::DispatchError;

/// Maximum full namespace length the dispatcher accepts, mirroring the
/// original's hard-coded namespace size ceiling.
const MAX_NAMESPACE_LEN: usize = 128;

/// A parsed `db.collection` namespace. `KILL_CURSORS` is the one opcode
/// spec.md names as carrying no namespace at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    pub db: String,
    pub collection: String,
}

impl Namespace {
    pub fn parse(full: &str) -> Result<Self, DispatchError> {
        if full.is_empty() || full.len() > MAX_NAMESPACE_LEN {
            return Err(DispatchError::invalid_namespace(full));
        }
        let Some(dot) = full.find('.') else {
            return Err(DispatchError::invalid_namespace(full));
        };
        let db = &full[..dot];
        let collection = &full[dot + 1..];
        if db.is_empty() || collection.is_empty() {
            return Err(DispatchError::invalid_namespace(full));
        }
        if db.contains(' ') || full.contains('\0') {
            return Err(DispatchError::invalid_namespace(full));
        }
        Ok(Namespace {
            db: db.to_string(),
            collection: collection.to_string(),
        })
    }

    pub fn full(&self) -> String {
        format!("{}.{}", self.db, self.collection)
    }

    /// `true` for any collection named `$cmd` — the QUERY-as-command
    /// convention spec.md §3 describes.
    pub fn is_command(&self) -> bool {
        self.collection == "$cmd" || self.collection.starts_with("$cmd.")
    }

    /// Recognizes the three admin pseudo-commands that short-circuit the
    /// dispatcher before any `CurOp` is created:
    /// `<db>.$cmd.sys.inprog|killop|unlock`.
    pub fn admin_pseudo_command(&self) -> Option<AdminPseudoCommand> {
        match self.collection.as_str() {
            "$cmd.sys.inprog" => Some(AdminPseudoCommand::InProg),
            "$cmd.sys.killop" => Some(AdminPseudoCommand::KillOp),
            "$cmd.sys.unlock" => Some(AdminPseudoCommand::Unlock),
            _ => None,
        }
    }

    /// Whether this namespace names a replicated operation log, generalized
    /// from the original's `local.oplog.` prefix test into a configurable
    /// predicate the caller can widen or narrow.
    pub fn is_replicated_log(&self) -> bool {
        self.db == "local" && self.collection.starts_with("oplog.")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminPseudoCommand {
    InProg,
    KillOp,
    Unlock,
}
