//! Start-or-attach logic for a private PostgreSQL server
//!
//! [`Supervisor::start`] brings a data directory from "maybe nothing" to "a
//! server is accepting connections on its unix socket and the default
//! database exists":
//!
//! 1. initialize the cluster if the directory does not exist
//! 2. attach to an already running server (non-owning handle)
//! 3. otherwise start (or restart) it and create the default database

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use pgkv_core::Context;
use postgres::error::SqlState;
use postgres::NoTls;
use tracing::{debug, info, warn};

use crate::error::{check, SupervisorError};
use crate::pg_ctl::{PgCtl, ServerStatus};
use crate::registry;
use crate::server::ServerHandle;

/// File left in a data directory by a server that ran before
const POSTMASTER_OPTS: &str = "postmaster.opts";

/// Database every cluster ships with; used to bootstrap the default one
const MAINTENANCE_DB: &str = "postgres";

/// What the supervisor prepares inside a started cluster
#[derive(Debug, Clone)]
pub struct SupervisorOptions {
    /// Logical database created after start if missing
    pub database: String,
    /// Role used to connect over the unix socket
    pub user: String,
    /// Whether to check for and create `database` after start
    pub create_database: bool,
    /// How long pg_ctl waits for the server to come up or go down
    pub start_timeout: Duration,
    /// Connect timeout for the catalog connection
    pub connect_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            database: "kvs".to_string(),
            user: "postgres".to_string(),
            create_database: true,
            start_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Initializes, starts and attaches to PostgreSQL servers through pg_ctl
#[derive(Debug, Clone)]
pub struct Supervisor {
    pg_ctl: PgCtl,
    options: SupervisorOptions,
}

impl Supervisor {
    /// Supervise with the given pg_ctl and default options
    pub fn new(pg_ctl: PgCtl) -> Self {
        Self {
            pg_ctl,
            options: SupervisorOptions::default(),
        }
    }

    /// Supervise with pg_ctl found by [`PgCtl::locate`]
    pub fn locate(explicit: Option<&Path>) -> Result<Self, SupervisorError> {
        Ok(Self::new(PgCtl::locate(explicit)?))
    }

    /// Replace the options
    pub fn with_options(mut self, options: SupervisorOptions) -> Self {
        self.pg_ctl = self.pg_ctl.with_wait_timeout(options.start_timeout);
        self.options = options;
        self
    }

    /// The pg_ctl this supervisor drives
    pub fn pg_ctl(&self) -> &PgCtl {
        &self.pg_ctl
    }

    /// Current options
    pub fn options(&self) -> &SupervisorOptions {
        &self.options
    }

    /// True if `data_dir` exists, i.e. start will not run initdb
    pub fn is_initialized(data_dir: &Path) -> bool {
        data_dir.exists()
    }

    /// Ask pg_ctl whether a server runs on `data_dir`
    pub fn status(&self, ctx: &Context, data_dir: &Path) -> Result<ServerStatus, SupervisorError> {
        let data_dir = absolute(data_dir)?;
        self.pg_ctl.status(ctx, &data_dir)
    }

    /// Make sure a server runs on `data_dir` and return a handle to it
    ///
    /// Idempotent: calling it again, from this or another process, while the
    /// server runs yields a non-owning handle.
    ///
    /// # Errors
    ///
    /// Any [`SupervisorError`]. A failure after this call started the server
    /// stops it again before returning.
    pub fn start(&self, ctx: &Context, data_dir: impl AsRef<Path>) -> Result<ServerHandle, SupervisorError> {
        let data_dir = absolute(data_dir.as_ref())?;
        check(ctx)?;

        let lock = registry::dir_lock(&data_dir);
        let guard = lock.lock();

        if !Self::is_initialized(&data_dir) {
            self.initialize(ctx, &data_dir)?;
        }

        if self.pg_ctl.status(ctx, &data_dir)? == ServerStatus::Running {
            info!(target: "pgkv::supervisor", data_dir = %data_dir.display(), "postgres already running");
            return Ok(ServerHandle::borrowed(data_dir));
        }

        let restart = data_dir.join(POSTMASTER_OPTS).exists();
        if let Err(e) = self.pg_ctl.start(ctx, &data_dir, restart) {
            return match e {
                SupervisorError::StartFailed { .. } => self.attach_after_failed_start(&data_dir, e),
                SupervisorError::StartTimeout { .. }
                | SupervisorError::CommandTimeout { .. }
                | SupervisorError::Cancelled
                | SupervisorError::DeadlineExceeded => {
                    // The postmaster this call launched may still be coming up
                    warn!(
                        target: "pgkv::supervisor",
                        data_dir = %data_dir.display(),
                        error = %e,
                        "start did not complete, stopping postgres"
                    );
                    if let Err(stop_err) = self.pg_ctl.stop(&Context::background(), &data_dir) {
                        warn!(target: "pgkv::supervisor", error = %stop_err, "could not stop postgres after failed start");
                    }
                    Err(e)
                }
                e => Err(e),
            };
        }

        let handle = ServerHandle::owned(self.pg_ctl.clone(), data_dir);
        if self.options.create_database {
            if let Err(e) = self.ensure_database(ctx, handle.data_dir()) {
                warn!(
                    target: "pgkv::supervisor",
                    data_dir = %handle.data_dir().display(),
                    error = %e,
                    "default database setup failed, stopping postgres"
                );
                drop(guard);
                if let Err(stop_err) = handle.stop() {
                    warn!(target: "pgkv::supervisor", error = %stop_err, "could not stop postgres after failed start");
                }
                return Err(e);
            }
        }

        info!(target: "pgkv::supervisor", data_dir = %handle.data_dir().display(), "postgres started");
        Ok(handle)
    }

    /// Attach to a server another process started first, or report `err`
    fn attach_after_failed_start(
        &self,
        data_dir: &Path,
        err: SupervisorError,
    ) -> Result<ServerHandle, SupervisorError> {
        if let Ok(ServerStatus::Running) = self.pg_ctl.status(&Context::background(), data_dir) {
            info!(
                target: "pgkv::supervisor",
                data_dir = %data_dir.display(),
                error = %err,
                "start failed but postgres is running, attaching"
            );
            return Ok(ServerHandle::borrowed(data_dir.to_path_buf()));
        }
        warn!(target: "pgkv::supervisor", data_dir = %data_dir.display(), error = %err, "could not start postgres");
        Err(err)
    }

    /// Run initdb into a temporary sibling directory and move it into place
    fn initialize(&self, ctx: &Context, data_dir: &Path) -> Result<(), SupervisorError> {
        let parent = data_dir.parent().ok_or_else(|| {
            SupervisorError::io(
                format!("initializing {}", data_dir.display()),
                io::Error::new(io::ErrorKind::InvalidInput, "data directory has no parent"),
            )
        })?;
        fs::create_dir_all(parent)
            .map_err(|e| SupervisorError::io(format!("creating {}", parent.display()), e))?;

        // Removed on drop unless renamed into place
        let staging = tempfile::Builder::new()
            .prefix(".pgdir")
            .tempdir_in(parent)
            .map_err(|e| SupervisorError::io(format!("creating staging directory in {}", parent.display()), e))?;

        if let Err(e) = self.pg_ctl.initdb(ctx, staging.path(), data_dir) {
            warn!(target: "pgkv::supervisor", data_dir = %data_dir.display(), error = %e, "initdb failed");
            return Err(e);
        }

        match fs::rename(staging.path(), data_dir) {
            Ok(()) => {
                // The staging path is gone; nothing left for TempDir to remove
                let _ = staging.keep();
                info!(target: "pgkv::supervisor", data_dir = %data_dir.display(), "postgres cluster initialized");
                Ok(())
            }
            Err(_) if data_dir.exists() => {
                info!(
                    target: "pgkv::supervisor",
                    data_dir = %data_dir.display(),
                    "cluster was initialized concurrently, using existing directory"
                );
                Ok(())
            }
            Err(e) => Err(SupervisorError::io(
                format!("moving initialized cluster to {}", data_dir.display()),
                e,
            )),
        }
    }

    /// Create the default logical database if it does not exist yet
    fn ensure_database(&self, ctx: &Context, data_dir: &Path) -> Result<(), SupervisorError> {
        check(ctx)?;
        let database = &self.options.database;
        let mut client = postgres::Config::new()
            .user(&self.options.user)
            .dbname(MAINTENANCE_DB)
            .host_path(data_dir)
            .connect_timeout(self.options.connect_timeout)
            .connect(NoTls)
            .map_err(|e| self.catalog_error(e))?;

        let exists = client
            .query_opt("SELECT FROM pg_database WHERE datname = $1", &[database])
            .map_err(|e| self.catalog_error(e))?
            .is_some();
        if exists {
            debug!(target: "pgkv::supervisor", database = %database, "default database exists");
            return Ok(());
        }

        check(ctx)?;
        info!(target: "pgkv::supervisor", database = %database, "creating default database");
        match client.batch_execute(&format!("CREATE DATABASE {}", quote_ident(database))) {
            Ok(()) => Ok(()),
            Err(e) if e.code() == Some(&SqlState::DUPLICATE_DATABASE) => Ok(()),
            Err(e) => Err(self.catalog_error(e)),
        }
    }

    fn catalog_error(&self, source: postgres::Error) -> SupervisorError {
        SupervisorError::Catalog {
            database: self.options.database.clone(),
            source,
        }
    }
}

/// Locate pg_ctl and start a server on `data_dir` with default options
pub fn start(ctx: &Context, data_dir: impl AsRef<Path>) -> Result<ServerHandle, SupervisorError> {
    Supervisor::locate(None)?.start(ctx, data_dir)
}

fn absolute(path: &Path) -> Result<std::path::PathBuf, SupervisorError> {
    crate::absolute_path(path)
        .map_err(|e| SupervisorError::io(format!("resolving {}", path.display()), e))
}

/// Quote an SQL identifier
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
