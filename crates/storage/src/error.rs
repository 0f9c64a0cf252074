use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("record collision: {record_id}")]
    RecordCollision { record_id: String },

    #[error("core error: {0}")]
    Core(#[from] tablesync_core::CoreError),
}

impl StorageError {
    pub fn is_collision(&self) -> bool {
        matches!(self, Self::RecordCollision { .. })
    }
}
