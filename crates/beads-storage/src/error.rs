//! Storage error types.

use rusqlite::ErrorCode;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g., "issue", "config").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The database has not been initialized.
    #[error("database not initialized: {reason}")]
    NotInitialized { reason: String },

    /// A validation constraint was violated.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Adding a dependency would create a cycle. `path` runs from the new
    /// edge's object back to its subject.
    #[error("adding this dependency would create a cycle: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    /// ID generation exhausted every candidate.
    #[error("failed to generate a unique ID for '{title}'")]
    IdExhausted { title: String },

    /// The database is locked by another process.
    #[error("database locked: {0}")]
    DatabaseLocked(String),

    /// Failed to establish or maintain a database connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// A transaction operation failed.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A schema migration failed.
    #[error("migration {name} failed: {reason}")]
    Migration { name: String, reason: String },

    /// A raw SQLite query error.
    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A spawned template mapping was rejected.
    #[error("template error: {0}")]
    Template(#[from] beads_core::template::TemplateError),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    // -- Constructors --------------------------------------------------------

    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    // -- Predicates ----------------------------------------------------------

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the error is transient and the whole operation may
    /// succeed on retry (database busy or locked, connection errors).
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::DatabaseLocked(_) | Self::Connection(_) | Self::Transaction(_) => true,
            Self::Query(rusqlite::Error::SqliteFailure(e, _)) => {
                matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_is_retryable() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(StorageError::Query(busy).is_retryable());
        assert!(!StorageError::not_found("issue", "bd-1").is_retryable());
        assert!(!StorageError::CycleDetected { path: vec![] }.is_retryable());
    }

    #[test]
    fn cycle_message_lists_path() {
        let err = StorageError::CycleDetected {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(
            err.to_string(),
            "adding this dependency would create a cycle: a -> b -> a"
        );
    }
}
