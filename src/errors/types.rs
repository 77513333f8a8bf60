use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported database server: {0}")]
    UnsupportedBackend(String),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<StoreError>,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database is not open")]
    Closed,

    #[error("Session is in use: {0}")]
    SessionInUse(String),
}
