use tally_common::types::{InvalidMetric, MetricKind};

/// Errors returned by the storage layer.
///
/// # Examples
///
/// ```rust
/// use tally_common::types::MetricKind;
/// use tally_storage::StorageError;
///
/// let err = StorageError::NotRegistered {
///     kind: MetricKind::Gauge,
///     name: "Alloc".to_string(),
/// };
/// assert!(err.to_string().contains("Alloc"));
/// assert!(!err.is_transient());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The metric name was never written under this kind.
    #[error("Storage: {kind} '{name}' is not registered")]
    NotRegistered { kind: MetricKind, name: String },

    #[error("Storage: counter '{name}' overflowed")]
    CounterOverflow { name: String },

    #[error("Storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Reading or writing the dump file failed.
    #[error("Storage: dump file {path}: {source}")]
    Dump {
        path: String,
        source: std::io::Error,
    },

    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A dump record was structurally valid JSON but not a usable metric.
    #[error("Storage: invalid record: {0}")]
    InvalidRecord(#[from] InvalidMetric),
}

impl StorageError {
    pub fn is_not_registered(&self) -> bool {
        matches!(self, StorageError::NotRegistered { .. })
    }

    /// True for connection-class database failures worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Database(e) => crate::db::is_transient(e),
            _ => false,
        }
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
