//! Error types shared by the SQLite storage implementation.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result alias returning [`SqliteDaoError`] failures.
pub type SqliteResult<T> = Result<T, SqliteDaoError>;

/// Failures that can occur while interacting with the SQLite database.
#[derive(Debug, Error)]
pub enum SqliteDaoError {
    /// The database file could not be opened.
    #[error("failed to open SQLite database `{}`", path.display())]
    Open {
        /// Database path.
        path: PathBuf,
        /// Driver error.
        #[source]
        source: rusqlite::Error,
    },
    /// A statement failed.
    #[error("SQLite statement failed")]
    Query(#[from] rusqlite::Error),
    /// The blocking worker running the statement panicked or was cancelled.
    #[error("SQLite worker task failed")]
    Join(#[from] tokio::task::JoinError),
    /// A previous statement panicked while holding the connection.
    #[error("SQLite connection lock poisoned")]
    Poisoned,
}
