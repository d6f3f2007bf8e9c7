//! Storage-specific error type wrapping sqlx errors.

use steroids_domain::error::ServiceError;

/// Errors originating from the `SQLite` storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A query or connection failed.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// Failed to (de)serialize stored job parameters.
    #[error("JSON serialization error")]
    Json(#[from] serde_json::Error),

    /// Failed to run migrations.
    #[error("migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// `commit`, `rollback` or a connection was requested outside a transaction.
    #[error("no transaction is open")]
    NoTransaction,

    /// A unit was begun outside any call chain.
    #[error("transaction begun outside a call chain scope")]
    OutsideScope,

    /// A nested participant rolled back, so the outermost commit was turned
    /// into a rollback.
    #[error("transaction was marked rollback-only by a nested participant")]
    RollbackOnly,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        Self::Storage(Box::new(err))
    }
}
