use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to initialize: {0}")]
    InitError(String),
    #[error("DB seems to be in a bad state: {0}")]
    BadStateError(String),
    #[error("Invalid feed cursor: {0:?}")]
    InvalidFeedCursor(String),
    #[error("Sqlite error")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Storage task failed to complete")]
    JoinError(#[from] tokio::task::JoinError),
}
