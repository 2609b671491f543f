//! Database builder for fluent configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pgkv_core::{Context, Error, KeyValidator, Result};

use super::{Database, StoreConfig};

// ============================================================================
// Database Builder Pattern
// ============================================================================

/// Builder for [`Database`]
///
/// ```ignore
/// use pgkv::{Context, Database, MaxKeyLength};
///
/// let ctx = Context::background();
/// let db = Database::builder()
///     .path("/var/lib/app/pg")
///     .lock_timeout(Duration::from_millis(200))
///     .validator(MaxKeyLength(1024))
///     .open(&ctx)?;
/// ```
#[derive(Clone, Default)]
pub struct DatabaseBuilder {
    /// Data directory (required)
    path: Option<PathBuf>,
    config: StoreConfig,
    validator: Option<Arc<dyn KeyValidator>>,
}

impl DatabaseBuilder {
    /// Create new builder with the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data directory
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the row lock wait limit
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.with_lock_timeout(timeout);
        self
    }

    /// Set the pool size
    pub fn pool_size(mut self, pool_size: u32) -> Self {
        self.config = self.config.with_pool_size(pool_size);
        self
    }

    /// Restrict accepted keys
    pub fn validator(mut self, validator: impl KeyValidator + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    /// Start (or attach to) the server and open the database
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if no path was set, otherwise as [`Database::open`].
    pub fn open(self, ctx: &Context) -> Result<Database> {
        let path = self.require_path()?;
        Database::open_inner(ctx, &path, self.config, self.validator, true)
    }

    /// Open the database on an already running server
    pub fn connect(self, ctx: &Context) -> Result<Database> {
        let path = self.require_path()?;
        Database::open_inner(ctx, &path, self.config, self.validator, false)
    }

    fn require_path(&self) -> Result<PathBuf> {
        self.path
            .clone()
            .ok_or_else(|| Error::invalid_argument("DatabaseBuilder requires a path"))
    }
}

impl std::fmt::Debug for DatabaseBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseBuilder")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("has_validator", &self.validator.is_some())
            .finish()
    }
}
