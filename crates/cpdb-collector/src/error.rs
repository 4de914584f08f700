use cpdb_core::CoreError;
use cpdb_db::DbError;
use thiserror::Error;

/// Errors that abort a collector operation as a whole.
///
/// Remote failures for a single account are not errors at this level: they
/// are reported as [`crate::AccountOutcome::Failed`] inside the summary.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The store could not be read or written during cycle setup.
    #[error("account store error: {0}")]
    Store(#[from] DbError),

    /// Another collection cycle holds the single-flight guard.
    #[error("a collection cycle is already in progress")]
    CycleInProgress,

    #[error(transparent)]
    InvalidHandle(#[from] CoreError),

    #[error("handle @{0} is already tracked")]
    DuplicateHandle(String),

    #[error("tracked account not found: {0}")]
    AccountNotFound(String),

    /// The collector cannot be built from the current configuration.
    #[error("collector configuration error: {0}")]
    Config(String),
}
