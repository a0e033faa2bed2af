use thiserror::Error;

/// Errors raised by the persistence layer.
///
/// The suggestion path never sees these: prediction code folds every failure
/// into an empty result set. Persistence and import/export callers get the
/// full error so the auto-save timer can log and retry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
