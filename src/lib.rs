//! # Recruitdb - Multi-tenant local store for scraped recruiting data
//!
//! Recruiting data lives in one embedded database per team, plus a master
//! registry listing every known team and cross-team configuration.
//!
//! Recruitdb provides:
//! - A per-team document store for recruits, key/value config and team metadata
//! - A master registry of teams with merge-on-update records
//! - A router facade that tracks the active team and delegates CRUD
//! - Connection management with bounded retry, backoff and deadlines
//! - A pluggable embedded-engine seam (SQLite in production)

pub mod config;
pub mod engine;
pub mod recruit;
pub mod storage;
pub mod team;

// Re-exports for convenient access
pub use config::{StoreConfig, Timings};
pub use engine::sqlite::SqliteEngine;
pub use recruit::Recruit;
pub use storage::registry::MasterRegistry;
pub use storage::router::StoreRouter;
pub use storage::store::{ClearOutcome, TeamStore};
pub use team::{TeamInfo, TeamRecord, TeamStats};

/// Result type alias for recruitdb operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for recruitdb operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage engine error: {0}")]
    Engine(String),

    #[error("could not open database '{database}' after {attempts} attempts: {source}")]
    Connection {
        database: String,
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("timed out opening database '{database}' after {timeout:?}")]
    ConnectionTimeout {
        database: String,
        timeout: std::time::Duration,
    },

    #[error("transaction timed out after {timeout:?}")]
    TransactionTimeout { timeout: std::time::Duration },

    #[error("transaction failed after {attempts} attempts: {source}")]
    TransactionFailed {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("team '{0}' is not registered")]
    TeamNotFound(String),

    #[error("no active team selected")]
    NoActiveTeam,

    #[error("invalid document: {0}")]
    Document(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the transaction executor may retry after this error.
    ///
    /// Engine-level failures are transient; domain errors (bad documents,
    /// unknown teams, no active team) abort immediately.
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, Error::Sqlite(_) | Error::Engine(_) | Error::Io(_))
    }

    /// Whether the underlying connection reported itself closing/closed.
    /// The executor discards the cached connection before retrying these.
    pub(crate) fn is_connection_lost(&self) -> bool {
        let message = match self {
            Error::Sqlite(e) => e.to_string(),
            Error::Engine(m) => m.clone(),
            _ => return false,
        };
        let message = message.to_ascii_lowercase();
        message.contains("closing") || message.contains("closed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_lost_detection() {
        let err = Error::Engine("database connection is closing".to_string());
        assert!(err.is_connection_lost());

        let err = Error::Engine("connection closed by peer".to_string());
        assert!(err.is_connection_lost());

        let err = Error::Engine("disk full".to_string());
        assert!(!err.is_connection_lost());

        assert!(!Error::NoActiveTeam.is_connection_lost());
    }

    #[test]
    fn domain_errors_are_not_retryable() {
        assert!(!Error::NoActiveTeam.is_retryable());
        assert!(!Error::TeamNotFound("1234".to_string()).is_retryable());
        assert!(Error::Engine("boom".to_string()).is_retryable());
    }
}
