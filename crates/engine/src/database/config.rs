//! Store configuration
//!
//! A [`StoreConfig`] can be built in code (`Default` plus `with_*` methods)
//! or loaded from a TOML file such as `pgkv.toml`. Missing fields take their
//! defaults, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use pgkv_core::{Error, Result};
use pgkv_supervisor::SupervisorOptions;

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "pgkv.toml";

/// Configuration of a [`Database`](super::Database)
///
/// # Example
///
/// ```toml
/// # Logical database holding the kv table
/// database = "kvs"
///
/// # Milliseconds a statement waits on a row lock before failing with a conflict
/// lock_timeout_ms = 1000
///
/// # pg_ctl = "/usr/lib/postgresql/16/bin/pg_ctl"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Explicit pg_ctl binary; looked up when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pg_ctl: Option<PathBuf>,
    /// Logical database name
    pub database: String,
    /// Role used to connect
    pub user: String,
    /// Row lock wait limit per statement, in milliseconds
    pub lock_timeout_ms: u64,
    /// Maximum number of pooled sessions
    pub pool_size: u32,
    /// Connect and pool checkout limit, in milliseconds
    pub connect_timeout_ms: u64,
    /// How long pg_ctl waits for the server to start or stop, in seconds
    pub start_timeout_secs: u64,
    /// Rows fetched per round trip by range cursors
    pub fetch_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            pg_ctl: None,
            database: "kvs".to_string(),
            user: "postgres".to_string(),
            lock_timeout_ms: 1000,
            pool_size: 16,
            connect_timeout_ms: 10_000,
            start_timeout_secs: 60,
            fetch_size: 128,
        }
    }
}

impl StoreConfig {
    /// Set the pg_ctl binary
    pub fn with_pg_ctl(mut self, path: impl Into<PathBuf>) -> Self {
        self.pg_ctl = Some(path.into());
        self
    }

    /// Set the logical database name
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the row lock wait limit
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the pool size
    pub fn with_pool_size(mut self, pool_size: u32) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the range cursor batch size
    pub fn with_fetch_size(mut self, fetch_size: u32) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    /// Set the server start/stop wait limit
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout_secs = timeout.as_secs();
        self
    }

    /// Row lock wait limit
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Connect and checkout limit
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Server start/stop wait limit
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    /// Options for the supervisor that starts this store's server
    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            database: self.database.clone(),
            user: self.user.clone(),
            create_database: true,
            start_timeout: self.start_timeout(),
            connect_timeout: self.connect_timeout(),
        }
    }

    /// Check every field
    ///
    /// # Errors
    ///
    /// `Config` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if !is_identifier(&self.database) {
            return Err(Error::config(format!(
                "database {:?} must be non-empty and contain only ASCII letters, digits and '_'",
                self.database
            )));
        }
        if !is_identifier(&self.user) {
            return Err(Error::config(format!(
                "user {:?} must be non-empty and contain only ASCII letters, digits and '_'",
                self.user
            )));
        }
        if self.lock_timeout_ms == 0 {
            return Err(Error::config("lock_timeout_ms must be positive"));
        }
        if self.pool_size == 0 {
            return Err(Error::config("pool_size must be positive"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::config("connect_timeout_ms must be positive"));
        }
        if self.start_timeout_secs == 0 {
            return Err(Error::config("start_timeout_secs must be positive"));
        }
        if self.fetch_size == 0 {
            return Err(Error::config("fetch_size must be positive"));
        }
        Ok(())
    }

    /// Read, parse and validate a config file
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, `Config` if it does not parse or
    /// validate.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize this config to TOML and write it to `path`
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}
