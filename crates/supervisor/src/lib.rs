//! Process supervision for pgkv
//!
//! pgkv keeps its data in a private PostgreSQL cluster that lives in a
//! directory owned by the application. This crate drives `pg_ctl` to
//! initialize that cluster, start it (or attach to an already running one)
//! and stop it again:
//!
//! - [`PgCtl`]: resolved pg_ctl binary and its subcommands
//! - [`Supervisor`]: idempotent start-or-attach with default database setup
//! - [`ServerHandle`]: release handle; stops the server if it owns it
//!
//! ```ignore
//! use pgkv_core::Context;
//!
//! let handle = pgkv_supervisor::start(&Context::background(), "/var/lib/app/pg")?;
//! // ... connect over the unix socket in /var/lib/app/pg ...
//! handle.stop()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod pg_ctl;
mod registry;
pub mod server;
pub mod supervisor;

use std::env;
use std::io;
use std::path::{Path, PathBuf};

pub use error::SupervisorError;
pub use pg_ctl::{PgCtl, ServerStatus, PG_CTL_ENV, SERVER_CONFIG_FILE, SERVER_LOG_FILE};
pub use server::ServerHandle;
pub use supervisor::{start, Supervisor, SupervisorOptions};

/// Make `path` absolute against the current directory
///
/// Does not touch the filesystem beyond reading the current directory, so
/// `path` need not exist.
pub fn absolute_path(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()?.join(path))
    }
}
