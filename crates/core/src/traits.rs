//! Generic transactional key-value traits
//!
//! These traits are the capability set every pgkv store satisfies, and the
//! surface the conformance suite and the closure helpers are written against:
//!
//! - [`Reader`]: point reads and ordered range scans
//! - [`Writer`]: upserts and deletes
//! - [`ReadWriter`]: both (blanket-implemented)
//! - [`Transaction`]: a read-write unit that commits or rolls back
//! - [`Snapshot`]: a read-only view frozen at creation
//! - [`Store`]: factory for the two
//!
//! All methods take `&mut self`: a transaction is owned by one caller at a
//! time. Distinct transactions may run concurrently.

use std::io::{Cursor, Read};

use crate::context::Context;
use crate::error::Result;

/// Value returned by reads; a fully materialized, readable byte stream
pub type ValueReader = Cursor<Vec<u8>>;

/// One `(key, value)` pair produced by a range scan
pub type Entry = (Vec<u8>, ValueReader);

/// Read access to a keyspace
pub trait Reader {
    /// Iterator returned by [`Reader::ascend`] and [`Reader::descend`]
    ///
    /// Borrows the reader for its whole lifetime. After yielding an `Err`
    /// the iterator yields nothing more.
    type Range<'a>: Iterator<Item = Result<Entry>>
    where
        Self: 'a;

    /// Read the value stored under `key`
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty or rejected key
    /// - `Closed` after commit/rollback/discard
    /// - `NotFound` if the key does not exist
    fn get(&mut self, ctx: &Context, key: &[u8]) -> Result<ValueReader>;

    /// Scan `[begin, end)` in ascending key order
    ///
    /// Empty bounds are open. Fails with `InvalidArgument` before producing
    /// anything when both bounds are set and `begin > end`.
    fn ascend(&mut self, ctx: &Context, begin: &[u8], end: &[u8]) -> Result<Self::Range<'_>>;

    /// Scan `[begin, end)` in descending key order
    ///
    /// Yields exactly the pairs of `ascend(begin, end)`, reversed.
    fn descend(&mut self, ctx: &Context, begin: &[u8], end: &[u8]) -> Result<Self::Range<'_>>;
}

/// Write access to a keyspace
pub trait Writer {
    /// Create or replace the value under `key`
    ///
    /// The stream is read to the end before anything is sent to storage.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` for an empty or rejected key
    /// - `Io` if reading `value` fails
    /// - `Conflict` if the server gives up waiting on a contended key
    fn set(&mut self, ctx: &Context, key: &[u8], value: &mut dyn Read) -> Result<()>;

    /// Remove `key`
    ///
    /// # Errors
    ///
    /// `NotFound` if no row was removed.
    fn delete(&mut self, ctx: &Context, key: &[u8]) -> Result<()>;

    /// Convenience wrapper around [`Writer::set`] for in-memory values
    fn set_bytes(&mut self, ctx: &Context, key: &[u8], value: &[u8]) -> Result<()> {
        let mut reader = value;
        self.set(ctx, key, &mut reader)
    }
}

/// Both reads and writes
pub trait ReadWriter: Reader + Writer {}

impl<T: Reader + Writer + ?Sized> ReadWriter for T {}

/// A read-write transaction
///
/// Exactly one of `commit`/`rollback` finalizes it; any later call to either
/// fails with `Closed`.
pub trait Transaction: ReadWriter {
    /// Make all writes visible atomically
    ///
    /// A concurrent conflicting transaction makes this fail with `Conflict`.
    fn commit(&mut self, ctx: &Context) -> Result<()>;

    /// Discard all writes
    fn rollback(&mut self, ctx: &Context) -> Result<()>;
}

/// A read-only view of the keyspace as of its creation
pub trait Snapshot: Reader {
    /// Release the snapshot. Later calls fail with `Closed`.
    fn discard(&mut self, ctx: &Context) -> Result<()>;
}

/// A transactional key-value store
pub trait Store {
    /// Read-write transaction type
    type Transaction: Transaction;
    /// Read-only snapshot type
    type Snapshot: Snapshot;

    /// Begin a read-write transaction
    fn new_transaction(&self, ctx: &Context) -> Result<Self::Transaction>;

    /// Take a read-only snapshot
    fn new_snapshot(&self, ctx: &Context) -> Result<Self::Snapshot>;
}
