//! Per-batch lifecycle hooks.

use crate::core::statement::{ConnectionRole, StatementKind};
use crate::error::MigrateError;

/// What to do after a batch statement fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    /// Stop starting new batches, roll back and return the error.
    #[default]
    Abort,
    /// Record the failure and keep going; the transaction still commits.
    Continue,
}

/// Identifies the batch a hook is called for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchEvent {
    pub role: ConnectionRole,
    pub kind: StatementKind,
    pub batch_index: usize,
    /// Source rows covered by the statement.
    pub rows: usize,
    /// Rows reported affected by the engine (0 on error).
    pub rows_affected: u64,
}

/// Observer notified as batch statements settle.
///
/// Every method has a default: success hooks do nothing and error hooks
/// return [`ErrorAction::Abort`].
pub trait BatchObserver: Send + Sync {
    fn on_inserted_batch(&self, _event: &BatchEvent) {}

    fn on_deleted_batch(&self, _event: &BatchEvent) {}

    fn on_inserted_batch_error(&self, _event: &BatchEvent, _error: &MigrateError) -> ErrorAction {
        ErrorAction::Abort
    }

    fn on_deleted_batch_error(&self, _event: &BatchEvent, _error: &MigrateError) -> ErrorAction {
        ErrorAction::Abort
    }
}

/// Observer with all default hooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultObserver;

impl BatchObserver for DefaultObserver {}
