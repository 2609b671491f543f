//! Supervisor errors
//!
//! Every failure of the process-control layer is reported as a
//! [`SupervisorError`]. None of them are retried here. Converting into the
//! core [`pgkv_core::Error`] folds everything except cancellation into
//! `Unavailable`, keeping this error as the source.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use pgkv_core::{Context, Error};
use thiserror::Error;

/// Errors raised while supervising a PostgreSQL server
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The pg_ctl binary could not be resolved
    #[error("pg_ctl binary not found (looked in {tried})")]
    BinaryNotFound {
        /// Where the lookup went
        tried: String,
    },

    /// Filesystem or process spawning failure
    #[error("{context}: {source}")]
    Io {
        /// What was being done
        context: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// `pg_ctl initdb` exited with an error
    #[error("initdb failed for {data_dir}: {output}")]
    InitFailed {
        /// Final data directory that was being initialized
        data_dir: PathBuf,
        /// Combined output of the command
        output: String,
    },

    /// `pg_ctl start` or `restart` exited with an error
    #[error("could not start postgres in {data_dir}: {output}")]
    StartFailed {
        /// Data directory of the server
        data_dir: PathBuf,
        /// Combined output of the command
        output: String,
    },

    /// pg_ctl gave up waiting for the server to accept connections
    #[error("postgres in {data_dir} did not start within {timeout:?}")]
    StartTimeout {
        /// Data directory of the server
        data_dir: PathBuf,
        /// Wait limit passed to pg_ctl
        timeout: Duration,
    },

    /// `pg_ctl status` exited with something other than running/not running
    #[error("pg_ctl status failed for {data_dir} with exit code {code:?}: {output}")]
    StatusFailed {
        /// Data directory that was checked
        data_dir: PathBuf,
        /// Exit code, if the process exited normally
        code: Option<i32>,
        /// Combined output of the command
        output: String,
    },

    /// `pg_ctl stop` exited with an error
    #[error("could not stop postgres in {data_dir}: {output}")]
    StopFailed {
        /// Data directory of the server
        data_dir: PathBuf,
        /// Combined output of the command
        output: String,
    },

    /// A pg_ctl command ran past its time limit and was killed
    #[error("pg_ctl {command} did not finish within {timeout:?}")]
    CommandTimeout {
        /// pg_ctl subcommand
        command: &'static str,
        /// Limit that was exceeded
        timeout: Duration,
    },

    /// The default logical database could not be checked or created
    #[error("could not prepare database {database:?}: {source}")]
    Catalog {
        /// Logical database name
        database: String,
        /// Client error
        #[source]
        source: postgres::Error,
    },

    /// The caller's context was cancelled
    #[error("server supervision cancelled")]
    Cancelled,

    /// The caller's context deadline passed
    #[error("server supervision deadline exceeded")]
    DeadlineExceeded,
}

impl SupervisorError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        SupervisorError::Io {
            context: context.into(),
            source,
        }
    }

    /// True when this host has no usable PostgreSQL
    ///
    /// That is: no pg_ctl was found, or initdb refused to run because the
    /// process is root. Every other error points at a real failure.
    pub fn is_missing_installation(&self) -> bool {
        match self {
            SupervisorError::BinaryNotFound { .. } => true,
            SupervisorError::InitFailed { output, .. } => output.contains("cannot be run as root"),
            _ => false,
        }
    }

    /// True when the error came from the caller's context
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            SupervisorError::Cancelled | SupervisorError::DeadlineExceeded
        )
    }
}

/// Fail with the context's error if it is done
pub(crate) fn check(ctx: &Context) -> Result<(), SupervisorError> {
    match ctx.err() {
        None => Ok(()),
        Some(Error::DeadlineExceeded) => Err(SupervisorError::DeadlineExceeded),
        Some(_) => Err(SupervisorError::Cancelled),
    }
}

// Conversion to the core error
impl From<SupervisorError> for Error {
    fn from(e: SupervisorError) -> Self {
        match e {
            SupervisorError::Cancelled => Error::Cancelled,
            SupervisorError::DeadlineExceeded => Error::DeadlineExceeded,
            other => Error::Unavailable {
                reason: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}
