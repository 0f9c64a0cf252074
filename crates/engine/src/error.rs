use tablesync_core::CoreError;
use tablesync_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Automation or base is set up in a way that cannot execute: missing
    /// trigger/action, unknown target table, or no masterlist table.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("record not found: {0}")]
    RecordNotFound(String),

    #[error("masterlist sync failed for {record_id}: {source}")]
    Sync {
        record_id: String,
        #[source]
        source: StorageError,
    },
}

impl EngineError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}
