//! Sync-specific error types
//!
//! Remote-call failures carry enough classification for the replay engine to
//! decide between retrying, deferring and dead-lettering.

use std::time::Duration;

use fintrack_domain::FinTrackError;
use thiserror::Error;

/// Categories of sync errors, mirroring the HTTP status families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorCategory {
    /// Authentication errors (401, 403)
    Authentication,
    /// Rate limiting errors (429)
    RateLimit,
    /// Server errors (5xx)
    Server,
    /// Client errors (400, 404, 422, undecodable payloads)
    Client,
    /// Unique or state conflicts (409)
    Conflict,
    /// Network/connection errors and timeouts
    Network,
    /// Local storage errors
    Database,
    /// Configuration errors
    Config,
}

/// How the replay engine treats a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Consumes retry budget; the operation stays queued.
    Transient,
    /// Consumes nothing; the pass stops and re-authentication is requested.
    Unauthorized,
    /// Resubmission would fail the same way; dead-letter immediately.
    Rejected,
}

/// Sync operation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,
}

impl SyncError {
    /// Get the error category for this error
    pub const fn category(&self) -> SyncErrorCategory {
        match self {
            Self::Auth(_) => SyncErrorCategory::Authentication,
            Self::RateLimit(_) => SyncErrorCategory::RateLimit,
            Self::Server(_) => SyncErrorCategory::Server,
            Self::Client(_) => SyncErrorCategory::Client,
            Self::Conflict(_) => SyncErrorCategory::Conflict,
            Self::Network(_) | Self::Timeout(_) | Self::Cancelled => SyncErrorCategory::Network,
            Self::Database(_) => SyncErrorCategory::Database,
            Self::Config(_) => SyncErrorCategory::Config,
        }
    }

    pub const fn failure_class(&self) -> FailureClass {
        match self.category() {
            SyncErrorCategory::Authentication => FailureClass::Unauthorized,
            SyncErrorCategory::Client | SyncErrorCategory::Conflict => FailureClass::Rejected,
            SyncErrorCategory::RateLimit
            | SyncErrorCategory::Server
            | SyncErrorCategory::Network
            | SyncErrorCategory::Database
            | SyncErrorCategory::Config => FailureClass::Transient,
        }
    }

    /// Check if this error should be retried with the same credentials
    pub const fn should_retry(&self) -> bool {
        matches!(self.failure_class(), FailureClass::Transient)
    }
}

/// Convert from FinTrackError to SyncError
impl From<FinTrackError> for SyncError {
    fn from(err: FinTrackError) -> Self {
        match err {
            FinTrackError::Database(message) => Self::Database(message),
            FinTrackError::Config(message) => Self::Config(message),
            FinTrackError::Network(message) => Self::Network(message),
            FinTrackError::Auth(message) => Self::Auth(message),
            FinTrackError::Conflict(message) => Self::Conflict(message),
            FinTrackError::NotFound(message) | FinTrackError::InvalidInput(message) => {
                Self::Client(message)
            }
            FinTrackError::Internal(message) => Self::Server(message),
        }
    }
}

impl From<SyncError> for FinTrackError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Auth(message) => Self::Auth(message),
            SyncError::Client(message) => Self::InvalidInput(message),
            SyncError::Conflict(message) => Self::Conflict(message),
            SyncError::Database(message) => Self::Database(message),
            SyncError::Config(message) => Self::Config(message),
            other @ (SyncError::RateLimit(_)
            | SyncError::Server(_)
            | SyncError::Network(_)
            | SyncError::Timeout(_)
            | SyncError::Cancelled) => Self::Network(other.to_string()),
        }
    }
}
