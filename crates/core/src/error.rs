//! Error types for pgkv
//!
//! Every fallible operation in the workspace returns [`Error`]. Callers that
//! need to branch on the failure (retry on conflict, treat a missing key as
//! absent, ...) should match on [`Error::kind`] instead of individual
//! variants, since several variants share a kind.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use thiserror::Error;

/// Boxed error used to keep the underlying cause of an engine failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for pgkv operations
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
///
/// | Kind | Raised when |
/// |------|-------------|
/// | `InvalidArgument` | empty or rejected key, malformed range |
/// | `NotFound` | missing key on read or delete |
/// | `Closed` | operation on a finished transaction or a closed database |
/// | `Conflict` | serialization failure, deadlock or lock timeout |
/// | `Io` | value stream read/write failure |
/// | `Unavailable` | server supervision or connection failure |
/// | `Cancelled` | the caller's context was cancelled or its deadline passed |
/// | `Engine` | any other failure reported by the server |
/// | `Config` | invalid configuration |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad input detected before any server call
    InvalidArgument,
    /// Key does not exist
    NotFound,
    /// Transaction or database already finished
    Closed,
    /// Concurrency failure detected by the server
    Conflict,
    /// Stream I/O failure
    Io,
    /// Server could not be started or reached
    Unavailable,
    /// Context cancelled or deadline exceeded
    Cancelled,
    /// Other server-side failure
    Engine,
    /// Invalid configuration
    Config,
}

/// Error types for pgkv
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid key, value or range
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the input
        reason: String,
    },

    /// Key not found
    #[error("key not found")]
    NotFound,

    /// Operation on a committed/rolled back transaction or a closed database
    #[error("{what} is closed")]
    Closed {
        /// The closed resource ("transaction", "snapshot", "database")
        what: &'static str,
    },

    /// Serialization failure, deadlock or lock timeout reported by the server
    ///
    /// Never retried by this crate; the caller decides.
    #[error("conflict: {reason}")]
    Conflict {
        /// Server message, prefixed with the failing operation
        reason: String,
        /// SQLSTATE reported by the server, when known
        sqlstate: Option<String>,
        /// Underlying client error
        #[source]
        source: Option<BoxError>,
    },

    /// I/O error while reading a value stream
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Server supervision or connectivity failure
    #[error("unavailable: {reason}")]
    Unavailable {
        /// Human-readable description
        reason: String,
        /// Underlying cause
        #[source]
        source: Option<BoxError>,
    },

    /// The caller's context was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's context deadline passed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Transaction was aborted by the server after an earlier failed statement
    #[error("transaction aborted: {reason}")]
    Aborted {
        /// Message of the statement that aborted the transaction
        reason: String,
    },

    /// Other server-side failure
    #[error("{context}: {source}")]
    Engine {
        /// Operation that failed
        context: String,
        /// Underlying client error
        #[source]
        source: BoxError,
    },

    /// Invalid configuration
    #[error("invalid configuration: {reason}")]
    Config {
        /// What was wrong
        reason: String,
    },
}

impl Error {
    /// Create an invalid-argument error
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a closed error for the named resource
    pub fn closed(what: &'static str) -> Self {
        Error::Closed { what }
    }

    /// Create an unavailable error without an underlying cause
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Error::Unavailable {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Error::Config {
            reason: reason.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Error::NotFound => ErrorKind::NotFound,
            Error::Closed { .. } => ErrorKind::Closed,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::Io(_) => ErrorKind::Io,
            Error::Unavailable { .. } => ErrorKind::Unavailable,
            Error::Cancelled | Error::DeadlineExceeded => ErrorKind::Cancelled,
            Error::Aborted { .. } | Error::Engine { .. } => ErrorKind::Engine,
            Error::Config { .. } => ErrorKind::Config,
        }
    }

    /// True for serialization failures and lock timeouts
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// True when the key does not exist
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// True when the transaction or database is already finished
    pub fn is_closed(&self) -> bool {
        self.kind() == ErrorKind::Closed
    }

    /// True for rejected keys, values and ranges
    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }

    /// True when the caller's context ended the operation
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// SQLSTATE attached to a conflict, if any
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Conflict { sqlstate, .. } => sqlstate.as_deref(),
            _ => None,
        }
    }
}
