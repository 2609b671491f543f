//! Shared helpers for server-backed engine tests
//!
//! Every test gets a private PostgreSQL cluster in a temp directory. When the
//! host has no usable PostgreSQL (pg_ctl missing, or initdb refusing to run
//! as root) the helpers return `None` and the test passes without doing
//! anything. Any other open failure fails the test.

#![allow(dead_code)]

use std::io::Read;

use pgkv_core::{Context, Error, Result};
use pgkv_engine::{Database, DatabaseBuilder, RangeIter};
use pgkv_supervisor::SupervisorError;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Test database wrapper that keeps its directory alive
pub struct TestDb {
    pub db: Database,
    pub dir: TempDir,
    pub ctx: Context,
}

impl TestDb {
    /// Open with default settings, or skip
    pub fn open() -> Option<Self> {
        Self::open_with(Database::builder())
    }

    /// Open with `builder` (its path is replaced), or skip
    pub fn open_with(builder: DatabaseBuilder) -> Option<Self> {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let ctx = Context::background();
        match builder.path(dir.path().join("database")).open(&ctx) {
            Ok(db) => Some(TestDb { db, dir, ctx }),
            Err(e) if missing_installation(&e) => {
                eprintln!("skipping: postgres unavailable: {}", e);
                None
            }
            Err(e) => panic!("open failed: {}", e),
        }
    }

    /// Commit `pairs` in one transaction
    pub fn load(&self, pairs: &[(&str, &str)]) {
        let mut txn = self.db.new_transaction(&self.ctx).unwrap();
        for (k, v) in pairs {
            txn.set_bytes(&self.ctx, k.as_bytes(), v.as_bytes()).unwrap();
        }
        txn.commit(&self.ctx).unwrap();
    }

    /// Value under `key` as seen by a fresh snapshot
    pub fn read(&self, key: &str) -> Result<String> {
        let mut snap = self.db.new_snapshot(&self.ctx)?;
        let value = snap.get(&self.ctx, key.as_bytes()).map(read_string);
        snap.discard(&self.ctx)?;
        value
    }
}

/// True if `err` means this host cannot run PostgreSQL at all
pub fn missing_installation(err: &Error) -> bool {
    std::error::Error::source(err)
        .and_then(|source| source.downcast_ref::<SupervisorError>())
        .map_or(false, SupervisorError::is_missing_installation)
}

/// Open a test database or return from the test
#[allow(unused_macros)]
macro_rules! test_db {
    () => {
        match common::TestDb::open() {
            Some(tdb) => tdb,
            None => return,
        }
    };
    ($builder:expr) => {
        match common::TestDb::open_with($builder) {
            Some(tdb) => tdb,
            None => return,
        }
    };
}

pub fn read_string(mut reader: impl Read) -> String {
    let mut out = String::new();
    reader.read_to_string(&mut out).unwrap();
    out
}

/// Drain a range into `(key, value)` strings, panicking on errors
pub fn collect(iter: RangeIter<'_>) -> Vec<(String, String)> {
    iter.map(|entry| {
        let (k, v) = entry.unwrap();
        (String::from_utf8(k).unwrap(), read_string(v))
    })
    .collect()
}

pub fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
