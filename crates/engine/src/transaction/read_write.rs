//! Read-write transactions

use std::io::Read;

use pgkv_core::traits;
use pgkv_core::{Context, Result, ValueReader};

use super::TxnCore;
use crate::range::RangeIter;
use crate::sql::Direction;

/// Serializable read-write transaction
///
/// Created by [`Database::new_transaction`](crate::Database::new_transaction).
/// Writes become visible to others atomically on [`commit`](Self::commit);
/// a concurrent conflicting transaction makes one of the two fail with a
/// `Conflict` error. Dropping an unfinished transaction rolls it back.
///
/// # Example
///
/// ```ignore
/// let mut txn = db.new_transaction(&ctx)?;
/// txn.set_bytes(&ctx, b"user:1", b"alice")?;
/// txn.commit(&ctx)?;
/// ```
pub struct Transaction {
    core: TxnCore,
}

impl Transaction {
    pub(crate) fn new(core: TxnCore) -> Self {
        Self { core }
    }

    /// Read the value under `key`
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty or rejected key, `Closed` after
    /// commit/rollback, `NotFound` if the key does not exist.
    pub fn get(&mut self, ctx: &Context, key: &[u8]) -> Result<ValueReader> {
        self.core.get(ctx, key)
    }

    /// Create or replace the value under `key`, read fully from `value`
    pub fn set(&mut self, ctx: &Context, key: &[u8], value: &mut dyn Read) -> Result<()> {
        self.core.set(ctx, key, value)
    }

    /// [`set`](Self::set) for an in-memory value
    pub fn set_bytes(&mut self, ctx: &Context, key: &[u8], value: &[u8]) -> Result<()> {
        let mut reader = value;
        self.core.set(ctx, key, &mut reader)
    }

    /// Remove `key`; `NotFound` if it did not exist
    pub fn delete(&mut self, ctx: &Context, key: &[u8]) -> Result<()> {
        self.core.delete(ctx, key)
    }

    /// Scan `[begin, end)` in ascending key order; empty bounds are open
    pub fn ascend(&mut self, ctx: &Context, begin: &[u8], end: &[u8]) -> Result<RangeIter<'_>> {
        self.core.range(ctx, begin, end, Direction::Ascending)
    }

    /// Scan `[begin, end)` in descending key order; empty bounds are open
    pub fn descend(&mut self, ctx: &Context, begin: &[u8], end: &[u8]) -> Result<RangeIter<'_>> {
        self.core.range(ctx, begin, end, Direction::Descending)
    }

    /// Make all writes visible atomically
    ///
    /// # Errors
    ///
    /// - `Closed` if already committed or rolled back
    /// - `Conflict` on a serialization failure, including one hit by an
    ///   earlier statement of this transaction
    /// - `Aborted` if an earlier statement failed for another reason
    pub fn commit(&mut self, ctx: &Context) -> Result<()> {
        self.core.commit(ctx)
    }

    /// Discard all writes; `Closed` if already finished
    pub fn rollback(&mut self, ctx: &Context) -> Result<()> {
        self.core.rollback(ctx)
    }

    /// False once committed or rolled back
    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    /// Range cursors currently open on the server
    pub fn open_cursors(&self) -> usize {
        self.core.open_cursors()
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("active", &self.core.is_active())
            .finish()
    }
}

impl traits::Reader for Transaction {
    type Range<'a> = RangeIter<'a>;

    fn get(&mut self, ctx: &Context, key: &[u8]) -> Result<ValueReader> {
        Transaction::get(self, ctx, key)
    }

    fn ascend(&mut self, ctx: &Context, begin: &[u8], end: &[u8]) -> Result<RangeIter<'_>> {
        Transaction::ascend(self, ctx, begin, end)
    }

    fn descend(&mut self, ctx: &Context, begin: &[u8], end: &[u8]) -> Result<RangeIter<'_>> {
        Transaction::descend(self, ctx, begin, end)
    }
}

impl traits::Writer for Transaction {
    fn set(&mut self, ctx: &Context, key: &[u8], value: &mut dyn Read) -> Result<()> {
        Transaction::set(self, ctx, key, value)
    }

    fn delete(&mut self, ctx: &Context, key: &[u8]) -> Result<()> {
        Transaction::delete(self, ctx, key)
    }
}

impl traits::Transaction for Transaction {
    fn commit(&mut self, ctx: &Context) -> Result<()> {
        Transaction::commit(self, ctx)
    }

    fn rollback(&mut self, ctx: &Context) -> Result<()> {
        Transaction::rollback(self, ctx)
    }
}
