//! Database handle and open/close logic
//!
//! A [`Database`] ties together:
//! - the server supervisor (when opened with [`Database::open`])
//! - an r2d2 pool of unix-socket sessions
//! - the `kv` table
//!
//! ## Transaction API
//!
//! 1. **Closure API** (recommended): [`pgkv_core::with_read_writer`] and
//!    [`pgkv_core::with_reader`] commit on success and roll back on error
//! 2. **Manual API**: [`Database::new_transaction`] + `commit()`/`rollback()`,
//!    [`Database::new_snapshot`] + `discard()`

mod builder;
pub mod config;

pub use builder::DatabaseBuilder;
pub use config::{StoreConfig, CONFIG_FILE_NAME};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use pgkv_core::{Context, Error, KeyValidator, Result, Store};
use pgkv_supervisor::{absolute_path, ServerHandle, Supervisor};
use r2d2::{Pool, PooledConnection};
use tracing::{debug, info, warn};

use crate::classify::{classify, pool_error};
use crate::session::SessionManager;
use crate::sql::{self, TxnMode};
use crate::transaction::{Snapshot, Transaction, TxnCore, TxnSettings};

// ============================================================================
// Database Struct
// ============================================================================

/// Handle to a transactional key-value store backed by PostgreSQL
///
/// `Database` is `Send + Sync`; share it with `Arc` across threads. Each
/// transaction holds one pooled session until it finishes.
///
/// # Example
///
/// ```ignore
/// use pgkv::{Context, Database};
///
/// let ctx = Context::background();
/// let db = Database::open(&ctx, "/var/lib/app/pg")?;
///
/// let mut txn = db.new_transaction(&ctx)?;
/// txn.set_bytes(&ctx, b"key", b"value")?;
/// txn.commit(&ctx)?;
///
/// db.close()?;
/// ```
pub struct Database {
    data_dir: PathBuf,
    config: StoreConfig,
    validator: Option<Arc<dyn KeyValidator>>,
    /// `None` once closed
    pool: RwLock<Option<Pool<SessionManager>>>,
    server: Mutex<Option<ServerHandle>>,
}

impl Database {
    /// Create a builder
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Start (or attach to) the server in `data_dir` and open the store
    ///
    /// The directory is initialized on first use. Uses the default
    /// [`StoreConfig`].
    ///
    /// # Errors
    ///
    /// `Unavailable` if the server cannot be started or reached, `Config`
    /// for an invalid configuration, `Cancelled` if `ctx` ends first.
    pub fn open(ctx: &Context, data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(ctx, data_dir, StoreConfig::default())
    }

    /// [`open`](Self::open) with an explicit configuration
    pub fn open_with_config(ctx: &Context, data_dir: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        Self::open_inner(ctx, data_dir.as_ref(), config, None, true)
    }

    /// Open the store on a server that is already running in `data_dir`
    ///
    /// The server is not supervised: closing the database leaves it running.
    pub fn connect(ctx: &Context, data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with_config(ctx, data_dir, StoreConfig::default())
    }

    /// [`connect`](Self::connect) with an explicit configuration
    pub fn connect_with_config(ctx: &Context, data_dir: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        Self::open_inner(ctx, data_dir.as_ref(), config, None, false)
    }

    pub(crate) fn open_inner(
        ctx: &Context,
        data_dir: &Path,
        config: StoreConfig,
        validator: Option<Arc<dyn KeyValidator>>,
        supervise: bool,
    ) -> Result<Self> {
        config.validate()?;
        let data_dir = absolute_path(data_dir)?;
        ctx.check()?;

        let server = if supervise {
            let supervisor =
                Supervisor::locate(config.pg_ctl.as_deref())?.with_options(config.supervisor_options());
            Some(supervisor.start(ctx, &data_dir)?)
        } else {
            None
        };

        let pool = match Self::connect_pool(ctx, &data_dir, &config) {
            Ok(pool) => pool,
            Err(e) => {
                if let Some(server) = server {
                    if let Err(stop_err) = server.stop() {
                        warn!(target: "pgkv::db", error = %stop_err, "could not stop postgres after failed open");
                    }
                }
                return Err(e);
            }
        };

        info!(
            target: "pgkv::db",
            data_dir = %data_dir.display(),
            database = %config.database,
            owns_server = server.as_ref().map_or(false, ServerHandle::is_owner),
            "database opened"
        );
        Ok(Self {
            data_dir,
            config,
            validator,
            pool: RwLock::new(Some(pool)),
            server: Mutex::new(server),
        })
    }

    /// Build the session pool and make sure the `kv` table exists
    fn connect_pool(ctx: &Context, data_dir: &Path, config: &StoreConfig) -> Result<Pool<SessionManager>> {
        ctx.check()?;
        let mut pg = postgres::Config::new();
        pg.user(&config.user)
            .dbname(&config.database)
            .host_path(data_dir)
            .connect_timeout(config.connect_timeout())
            .application_name("pgkv");

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(1))
            .connection_timeout(config.connect_timeout())
            .build(SessionManager::new(pg))
            .map_err(|e| pool_error("could not connect to postgres", e))?;

        let mut session = pool
            .get()
            .map_err(|e| pool_error("could not connect to postgres", e))?;
        session
            .client
            .batch_execute(sql::CREATE_TABLE)
            .map_err(|e| classify(ctx, "could not create kv table", e))?;
        debug!(target: "pgkv::db", "kv table ready");
        Ok(pool)
    }

    /// Use `validator` to restrict the keys this handle accepts
    pub fn with_validator(mut self, validator: impl KeyValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Absolute data directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Configuration the database was opened with
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// True if closing this handle stops the server
    pub fn owns_server(&self) -> bool {
        self.server
            .lock()
            .as_ref()
            .map_or(false, ServerHandle::is_owner)
    }

    /// True after [`close`](Self::close)
    pub fn is_closed(&self) -> bool {
        self.pool.read().is_none()
    }

    fn session(&self, ctx: &Context) -> Result<PooledConnection<SessionManager>> {
        ctx.check()?;
        let pool = self.pool.read().clone().ok_or(Error::closed("database"))?;
        let timeout = match ctx.remaining() {
            Some(left) => left.min(self.config.connect_timeout()).max(Duration::from_millis(1)),
            None => self.config.connect_timeout(),
        };
        pool.get_timeout(timeout).map_err(|e| match ctx.err() {
            Some(ctx_err) => ctx_err,
            None => pool_error("could not get a session", e),
        })
    }

    fn settings(&self) -> TxnSettings {
        TxnSettings {
            validator: self.validator.clone(),
            lock_timeout: self.config.lock_timeout(),
            fetch_size: self.config.fetch_size,
        }
    }

    /// Begin a serializable read-write transaction
    ///
    /// # Errors
    ///
    /// `Closed` after [`close`](Self::close), `Unavailable` if no session
    /// can be obtained, `Cancelled` if `ctx` ends first.
    pub fn new_transaction(&self, ctx: &Context) -> Result<Transaction> {
        let session = self.session(ctx)?;
        TxnCore::begin(session, ctx, TxnMode::ReadWrite, self.settings()).map(Transaction::new)
    }

    /// Take a read-only snapshot of the current committed state
    pub fn new_snapshot(&self, ctx: &Context) -> Result<Snapshot> {
        let session = self.session(ctx)?;
        TxnCore::begin(session, ctx, TxnMode::ReadOnly, self.settings()).map(Snapshot::new)
    }

    /// Close the pool and stop the server if this handle started it
    ///
    /// Sessions held by unfinished transactions are closed when those
    /// transactions are dropped.
    ///
    /// # Errors
    ///
    /// `Closed` if already closed, `Unavailable` if the server fails to stop.
    pub fn close(&self) -> Result<()> {
        let pool = self.pool.write().take();
        if pool.is_none() {
            return Err(Error::closed("database"));
        }
        drop(pool);
        info!(target: "pgkv::db", data_dir = %self.data_dir.display(), "database closed");

        if let Some(server) = self.server.lock().take() {
            server.stop()?;
        }
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.close() {
            warn!(target: "pgkv::db", error = %e, "failed to close database on drop");
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("data_dir", &self.data_dir)
            .field("database", &self.config.database)
            .field("closed", &self.is_closed())
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}

impl Store for Database {
    type Transaction = Transaction;
    type Snapshot = Snapshot;

    fn new_transaction(&self, ctx: &Context) -> Result<Transaction> {
        Database::new_transaction(self, ctx)
    }

    fn new_snapshot(&self, ctx: &Context) -> Result<Snapshot> {
        Database::new_snapshot(self, ctx)
    }
}
