//! Error types for the store layer

use crate::ops::OpResult;
use crate::protocol::RespError;
use std::fmt;
use thiserror::Error;

/// Why a backend could not be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionCause {
    /// The peer actively refused the connection
    Refused,
    /// The connection attempt did not complete in time
    Timeout,
    /// The host name could not be resolved
    HostNotFound,
    /// Credentials were rejected
    Unauthorized,
    /// The endpoint answered but the URL does not exist
    UrlNotFound,
    /// Anything else
    Other,
}

impl fmt::Display for ConnectionCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionCause::Refused => "connection refused",
            ConnectionCause::Timeout => "connection timed out",
            ConnectionCause::HostNotFound => "host not found",
            ConnectionCause::Unauthorized => "unauthorized",
            ConnectionCause::UrlNotFound => "url not found",
            ConnectionCause::Other => "connection failed",
        };
        f.write_str(s)
    }
}

/// A classified connection failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{cause} ({target}): {message}")]
pub struct ConnectionError {
    pub cause: ConnectionCause,
    /// Address or URL that was being contacted
    pub target: String,
    pub message: String,
}

impl ConnectionError {
    pub fn new(cause: ConnectionCause, target: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectionError {
            cause,
            target: target.into(),
            message: message.into(),
        }
    }

    /// Classify an io error raised while connecting to `target`
    pub fn from_io(target: impl Into<String>, err: &std::io::Error) -> Self {
        let cause = match err.kind() {
            std::io::ErrorKind::ConnectionRefused => ConnectionCause::Refused,
            std::io::ErrorKind::TimedOut => ConnectionCause::Timeout,
            _ => ConnectionCause::Other,
        };
        ConnectionError::new(cause, target, err.to_string())
    }
}

/// Errors surfaced by store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// A backend was selected without what it needs to run
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The backend could not be reached
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Transport failure while talking to an established backend
    #[error("retrieval error: {0}")]
    Retrieval(String),

    /// A reply or a stored hash had an unexpected shape
    #[error("parse error: {0}")]
    Parse(String),

    /// The backend answered with an error reply
    #[error("command error: {0}")]
    Command(String),

    /// Scores must be comparable
    #[error("invalid score: {0}")]
    InvalidScore(f64),

    /// First failing operation of a batch
    #[error("batch operation #{index} ({operation}) failed: {source}")]
    Batch {
        index: usize,
        operation: &'static str,
        #[source]
        source: Box<StoreError>,
        /// Results of the operations queued before the failing one
        completed: Vec<OpResult>,
    },

    /// The store was closed
    #[error("store is closed")]
    Closed,
}

impl From<RespError> for StoreError {
    fn from(err: RespError) -> Self {
        StoreError::Parse(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Parse(err.to_string())
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
