//! pgkv - transactional key-value store backed by a private PostgreSQL server
//!
//! pgkv keeps byte keys and byte values in one table of a PostgreSQL cluster
//! that it initializes and runs itself, in a directory you choose. Every
//! read-write transaction is serializable; snapshots are read-only views of
//! the committed state at the moment they were taken.
//!
//! # Quick Start
//!
//! ```ignore
//! use pgkv::{with_read_writer, Context, Database};
//!
//! let ctx = Context::background();
//! let db = Database::open(&ctx, "/var/lib/app/pg")?;
//!
//! with_read_writer(&db, &ctx, |txn| {
//!     txn.set_bytes(&ctx, b"user:123", b"Alice")?;
//!     Ok(())
//! })?;
//!
//! let mut snap = db.new_snapshot(&ctx)?;
//! for entry in snap.ascend(&ctx, b"user:", b"user;")? {
//!     let (key, value) = entry?;
//!     // ...
//! }
//! snap.discard(&ctx)?;
//! db.close()?;
//! ```
//!
//! # Architecture
//!
//! - `pgkv-core`: error taxonomy, [`Context`], key validation, store traits
//! - `pgkv-supervisor`: `pg_ctl` wrapper that initializes, starts and stops
//!   the server
//! - `pgkv-engine`: [`Database`], [`Transaction`], [`Snapshot`], [`RangeIter`]
//!
//! Conflicts are never retried internally; callers decide whether to retry
//! a transaction that failed with [`ErrorKind::Conflict`].

pub use pgkv_core::{
    validate_key, validate_range, with_read_writer, with_reader, BoxError, CancelHandle, Context,
    Entry, Error, ErrorKind, KeyValidator, MaxKeyLength, ReadWriter, Reader, RequirePrefix,
    Result, Store, ValueReader, Writer,
};

/// Store traits, for code generic over stores
pub mod traits {
    pub use pgkv_core::traits::*;
}

pub use pgkv_engine::{
    Database, DatabaseBuilder, RangeIter, Snapshot, StoreConfig, Transaction, CONFIG_FILE_NAME,
};

/// Server supervision, for callers that manage the server themselves
pub mod supervisor {
    pub use pgkv_supervisor::{
        start, PgCtl, ServerHandle, ServerStatus, Supervisor, SupervisorError,
        SupervisorOptions, PG_CTL_ENV, SERVER_LOG_FILE,
    };
}
