//! Error types for bqw-db

use thiserror::Error;

/// Warehouse operation errors
#[derive(Error, Debug, Clone)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Warehouse connection failed: {0}")]
    ConnectionError(String),

    /// Statement execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Dataset, table or view not found (D003)
    #[error("[D003] Not found: {0}")]
    NotFound(String),

    /// Request rejected by rate limiting (D004)
    #[error("[D004] Rate limited: {0}")]
    RateLimited(String),

    /// Call did not finish in time (D005)
    #[error("[D005] Timed out: {0}")]
    Timeout(String),

    /// Backend temporarily unavailable (D006)
    #[error("[D006] Service unavailable: {0}")]
    Unavailable(String),

    /// API returned a non-retryable error (D007)
    #[error("[D007] API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be understood (D008)
    #[error("[D008] Invalid response: {0}")]
    InvalidResponse(String),

    /// Mutex poisoned (D009)
    #[error("[D009] Database mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// Backend misconfigured (D010)
    #[error("[D010] Backend configuration error: {0}")]
    Config(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Returns `true` when retrying the same call may succeed.
    ///
    /// Rate limiting, timeouts, and temporary unavailability are retryable;
    /// everything else (bad SQL, missing objects, permission errors) is not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DbError::RateLimited(_) | DbError::Timeout(_) | DbError::Unavailable(_)
        )
    }
}

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        // duckdb::Error does not expose structured variants, so the message
        // is the only thing to classify on.
        let msg = err.to_string();
        if msg.contains("Could not set lock") || msg.contains("Conflicting lock") {
            DbError::Unavailable(msg)
        } else if msg.contains("Catalog Error") && msg.contains("does not exist") {
            DbError::NotFound(msg)
        } else {
            DbError::ExecutionError(msg)
        }
    }
}

impl From<reqwest::Error> for DbError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DbError::Timeout(err.to_string())
        } else if err.is_connect() {
            DbError::Unavailable(err.to_string())
        } else if err.is_decode() {
            DbError::InvalidResponse(err.to_string())
        } else {
            DbError::ConnectionError(err.to_string())
        }
    }
}
