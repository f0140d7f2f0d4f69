use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] rusqlite::Error),

    #[error("Migration {version} failed: {reason}")]
    MigrationFailed { version: i32, reason: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Database path error: {0}")]
    DatabasePathError(String),
}

impl StorageError {
    pub fn migration_failed(version: i32, reason: impl Into<String>) -> Self {
        StorageError::MigrationFailed {
            version,
            reason: reason.into(),
        }
    }

    pub fn database_path_error(reason: impl Into<String>) -> Self {
        StorageError::DatabasePathError(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
