// src/lasterror.rs

/// Per-client last-error slot: reset at the start of every request, then
/// populated by whichever handler runs, and readable by an explicit
/// accessor (the dispatch core's analogue of the `getLastError` command).
#[derive(Debug, Clone, Default)]
pub struct LastError {
    pub code: Option<i32>,
    pub message: Option<String>,
    pub n_updated: i64,
    pub n_deleted: i64,
    pub updated_existing: Option<bool>,
}

impl LastError {
    pub fn reset(&mut self) {
        *self = LastError::default();
    }

    pub fn record_error(&mut self, code: i32, message: impl Into<String>) {
        self.code = Some(code);
        self.message = Some(message.into());
    }

    pub fn record_update(&mut self, n: i64, updated_existing: bool) {
        self.n_updated += n;
        self.updated_existing = Some(updated_existing);
    }

    pub fn record_delete(&mut self, n: i64) {
        self.n_deleted += n;
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_none()
    }
}
