use thiserror::Error;

/// Errors that can occur when interacting with the system of record.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A pallet number already has records. Raised on unique-key conflicts.
    #[error("Duplicate pallet number: {0}")]
    Duplicate(String),

    /// A retryable failure such as an allocation race or a lock timeout.
    #[error("Transient store failure: {0}")]
    Transient(String),

    /// The requested entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation would violate an invariant (e.g. negative remaining qty).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The backend is unreachable or refused the request.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored identifier could not be parsed.
    #[error("Invalid identifier: {0}")]
    Identifier(#[from] common::IdentifierError),
}

impl StoreError {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Transient(_) => true,
            StoreError::Database(err) => match err {
                sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
                sqlx::Error::Database(db_err) => matches!(
                    db_err.code().as_deref(),
                    // serialization_failure, deadlock_detected, lock_not_available
                    Some("40001") | Some("40P01") | Some("55P03")
                ),
                _ => false,
            },
            _ => false,
        }
    }

    /// Returns true for unique-key conflicts on pallet records.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate(_))
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
