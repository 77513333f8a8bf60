use super::types::StoreError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
    /// Fatal errors stop the store from starting at all.
    pub fatal: bool,
}

impl StoreError {
    /// Classify this error to determine its type and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            StoreError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                retryable: false,
                fatal: true,
            },
            StoreError::UnsupportedBackend(_) => ErrorClassification {
                error_type: "UnsupportedBackendError",
                retryable: false,
                fatal: true,
            },
            StoreError::RetriesExhausted { .. } => ErrorClassification {
                error_type: "ConnectionError",
                retryable: false,
                fatal: true,
            },
            StoreError::Database(_) => ErrorClassification {
                error_type: "DatabaseError",
                retryable: true,
                fatal: false,
            },
            StoreError::Io(_) => ErrorClassification {
                error_type: "IoError",
                retryable: true,
                fatal: false,
            },
            StoreError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                retryable: false,
                fatal: false,
            },
            StoreError::Closed => ErrorClassification {
                error_type: "ClosedError",
                retryable: false,
                fatal: false,
            },
            StoreError::SessionInUse(_) => ErrorClassification {
                error_type: "SessionInUseError",
                retryable: false,
                fatal: false,
            },
        }
    }
}
