//! Read-only snapshots

use pgkv_core::traits;
use pgkv_core::{Context, Result, ValueReader};

use super::TxnCore;
use crate::range::RangeIter;
use crate::sql::Direction;

/// Read-only view of the store as of its creation
///
/// Commits made by other transactions after the snapshot was taken are
/// never visible through it.
pub struct Snapshot {
    core: TxnCore,
}

impl Snapshot {
    pub(crate) fn new(core: TxnCore) -> Self {
        Self { core }
    }

    /// Read the value under `key`
    pub fn get(&mut self, ctx: &Context, key: &[u8]) -> Result<ValueReader> {
        self.core.get(ctx, key)
    }

    /// Scan `[begin, end)` in ascending key order
    pub fn ascend(&mut self, ctx: &Context, begin: &[u8], end: &[u8]) -> Result<RangeIter<'_>> {
        self.core.range(ctx, begin, end, Direction::Ascending)
    }

    /// Scan `[begin, end)` in descending key order
    pub fn descend(&mut self, ctx: &Context, begin: &[u8], end: &[u8]) -> Result<RangeIter<'_>> {
        self.core.range(ctx, begin, end, Direction::Descending)
    }

    /// Release the snapshot; `Closed` if already discarded
    pub fn discard(&mut self, ctx: &Context) -> Result<()> {
        self.core.rollback(ctx)
    }

    /// False once discarded
    pub fn is_active(&self) -> bool {
        self.core.is_active()
    }

    /// Range cursors currently open on the server
    pub fn open_cursors(&self) -> usize {
        self.core.open_cursors()
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("active", &self.core.is_active())
            .finish()
    }
}

impl traits::Reader for Snapshot {
    type Range<'a> = RangeIter<'a>;

    fn get(&mut self, ctx: &Context, key: &[u8]) -> Result<ValueReader> {
        Snapshot::get(self, ctx, key)
    }

    fn ascend(&mut self, ctx: &Context, begin: &[u8], end: &[u8]) -> Result<RangeIter<'_>> {
        Snapshot::ascend(self, ctx, begin, end)
    }

    fn descend(&mut self, ctx: &Context, begin: &[u8], end: &[u8]) -> Result<RangeIter<'_>> {
        Snapshot::descend(self, ctx, begin, end)
    }
}

impl traits::Snapshot for Snapshot {
    fn discard(&mut self, ctx: &Context) -> Result<()> {
        Snapshot::discard(self, ctx)
    }
}
