//! Release handle for a supervised server

use std::path::{Path, PathBuf};

use pgkv_core::Context;
use tracing::{info, warn};

use crate::error::SupervisorError;
use crate::pg_ctl::PgCtl;
use crate::registry;

/// Handle to a server returned by [`Supervisor::start`](crate::Supervisor::start)
///
/// A handle either owns the server (this process started it) or merely
/// observed one that was already running. Only an owning handle stops the
/// server, either explicitly with [`ServerHandle::stop`] or best-effort on
/// drop. [`ServerHandle::detach`] gives up ownership and leaves the server
/// running.
#[derive(Debug)]
#[must_use = "dropping an owning handle stops the server"]
pub struct ServerHandle {
    pg_ctl: Option<PgCtl>,
    data_dir: PathBuf,
}

impl ServerHandle {
    pub(crate) fn owned(pg_ctl: PgCtl, data_dir: PathBuf) -> Self {
        Self {
            pg_ctl: Some(pg_ctl),
            data_dir,
        }
    }

    pub(crate) fn borrowed(data_dir: PathBuf) -> Self {
        Self {
            pg_ctl: None,
            data_dir,
        }
    }

    /// True if dropping or stopping this handle stops the server
    pub fn is_owner(&self) -> bool {
        self.pg_ctl.is_some()
    }

    /// Absolute data directory of the server
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Stop the server if this handle owns it
    ///
    /// # Errors
    ///
    /// `StopFailed` if pg_ctl could not stop the server.
    pub fn stop(mut self) -> Result<(), SupervisorError> {
        self.release()
    }

    /// Leave the server running and forget about it
    pub fn detach(mut self) {
        if self.pg_ctl.take().is_some() {
            info!(target: "pgkv::supervisor", data_dir = %self.data_dir.display(), "detached from postgres server");
        }
    }

    fn release(&mut self) -> Result<(), SupervisorError> {
        let Some(pg_ctl) = self.pg_ctl.take() else {
            return Ok(());
        };
        let lock = registry::dir_lock(&self.data_dir);
        let _guard = lock.lock();
        pg_ctl.stop(&Context::background(), &self.data_dir)
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(
                target: "pgkv::supervisor",
                data_dir = %self.data_dir.display(),
                error = %e,
                "failed to stop postgres server on drop"
            );
        }
    }
}
