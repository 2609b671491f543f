//! Ordered range scans over a server-side cursor
//!
//! A [`RangeIter`] owns one named cursor inside its transaction and pulls
//! rows in batches of `fetch_size`. It mutably borrows the transaction, so
//! nothing else can run on the session while the cursor is open.
//!
//! The cursor is released exactly once:
//! - on exhaustion, with an explicit `CLOSE` (a failure is yielded as the
//!   last item)
//! - on error, by the server, which drops it together with the aborted
//!   transaction
//! - on early drop, by `Drop` (failures are logged and poison the
//!   transaction)

use std::collections::VecDeque;
use std::io::Cursor;

use pgkv_core::{Context, Entry, Result};
use tracing::warn;

use crate::sql;
use crate::transaction::TxnCore;

/// Lazily fetched `(key, value)` pairs of a range
///
/// Created by `ascend`/`descend` on a transaction or snapshot. Yields
/// `Err` at most once; nothing follows it.
pub struct RangeIter<'t> {
    txn: &'t mut TxnCore,
    ctx: Context,
    cursor: Option<String>,
    buffer: VecDeque<Entry>,
    exhausted: bool,
    done: bool,
}

impl<'t> RangeIter<'t> {
    pub(crate) fn new(txn: &'t mut TxnCore, ctx: Context, cursor: String) -> Self {
        Self {
            txn,
            ctx,
            cursor: Some(cursor),
            buffer: VecDeque::new(),
            exhausted: false,
            done: false,
        }
    }

    /// Pull the next batch into the buffer
    fn fill(&mut self) -> Result<()> {
        let Some(name) = self.cursor.as_deref() else {
            self.exhausted = true;
            return Ok(());
        };
        let batch = self.txn.fetch_size();
        let fetch = sql::fetch(name, batch);
        let rows: Vec<Entry> = self.txn.run(&self.ctx, "could not read range", |c| {
            c.query(fetch.as_str(), &[])?
                .into_iter()
                .map(|row| -> std::result::Result<Entry, postgres::Error> {
                    Ok((row.try_get(0)?, Cursor::new(row.try_get(1)?)))
                })
                .collect()
        })?;
        if rows.len() < batch as usize {
            self.exhausted = true;
        }
        self.buffer.extend(rows);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        match self.cursor.take() {
            Some(name) => self.txn.close_cursor(&Context::background(), &name),
            None => Ok(()),
        }
    }
}

impl Iterator for RangeIter<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                return Some(Ok(entry));
            }
            if self.done {
                return None;
            }
            if self.exhausted {
                self.done = true;
                return self.close().err().map(Err);
            }
            if let Err(e) = self.fill() {
                self.done = true;
                if self.txn.has_failed() && self.cursor.take().is_some() {
                    self.txn.forget_cursor();
                }
                return Some(Err(e));
            }
        }
    }
}

impl Drop for RangeIter<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(target: "pgkv::txn", error = %e, "failed to close range cursor");
        }
    }
}

impl std::fmt::Debug for RangeIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeIter")
            .field("cursor", &self.cursor)
            .field("buffered", &self.buffer.len())
            .field("exhausted", &self.exhausted)
            .field("done", &self.done)
            .finish()
    }
}
