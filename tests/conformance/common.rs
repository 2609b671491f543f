//! Helpers shared by the conformance suites

#![allow(dead_code)]

use std::io::Read;

use pgkv::traits::{Reader, Store, Transaction, Writer};
use pgkv::supervisor::SupervisorError;
use pgkv::{Context, Database, Error, Result};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// True if `err` means this host cannot run PostgreSQL at all
pub fn missing_installation(err: &Error) -> bool {
    std::error::Error::source(err)
        .and_then(|source| source.downcast_ref::<SupervisorError>())
        .map_or(false, SupervisorError::is_missing_installation)
}

/// A database in a temp directory, or `None` without a PostgreSQL install
pub fn open_database() -> Option<(Database, TempDir)> {
    init_tracing();
    let dir = TempDir::new().unwrap();
    match Database::open(&Context::background(), dir.path().join("database")) {
        Ok(db) => Some((db, dir)),
        Err(e) if missing_installation(&e) => {
            eprintln!("skipping: postgres unavailable: {}", e);
            None
        }
        Err(e) => panic!("open failed: {}", e),
    }
}

/// Run `check` against a fresh database, skipping when none can be opened
pub fn with_database(check: impl FnOnce(&Database, &Context)) {
    if let Some((db, _dir)) = open_database() {
        check(&db, &Context::background());
        db.close().unwrap();
    }
}

pub fn read_value(mut reader: impl Read) -> Vec<u8> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out).unwrap();
    out
}

/// Commit `pairs` through the generic transaction API
pub fn put_all<S: Store>(store: &S, ctx: &Context, pairs: &[(&[u8], &[u8])]) -> Result<()> {
    let mut txn = store.new_transaction(ctx)?;
    for (k, v) in pairs {
        txn.set_bytes(ctx, k, v)?;
    }
    txn.commit(ctx)
}

/// Drain a range, returning keys and values
pub fn drain<R: Reader>(
    reader: &mut R,
    ctx: &Context,
    begin: &[u8],
    end: &[u8],
    descending: bool,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let iter = if descending {
        reader.descend(ctx, begin, end)?
    } else {
        reader.ascend(ctx, begin, end)?
    };
    iter.map(|entry| entry.map(|(k, v)| (k, read_value(v))))
        .collect()
}
