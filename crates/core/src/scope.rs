//! Closure API for scoped transactions
//!
//! Opening a transaction and forgetting to finish it on an early return is the
//! most common misuse of a transactional store. These helpers own the whole
//! lifecycle:
//!
//! - [`with_read_writer`]: commit on `Ok`, roll back on `Err`
//! - [`with_reader`]: snapshot discarded on every path
//!
//! Neither retries. A `Conflict` from commit is returned to the caller.
//!
//! ```ignore
//! let value = with_read_writer(&db, &ctx, |txn| {
//!     txn.set_bytes(&ctx, b"counter", b"1")?;
//!     Ok(())
//! })?;
//! ```

use tracing::debug;

use crate::context::Context;
use crate::error::Result;
use crate::traits::{Snapshot, Store, Transaction};

/// Run `f` inside a read-write transaction
///
/// Commits when `f` returns `Ok` and returns `f`'s value; otherwise rolls
/// back and returns `f`'s error.
///
/// # Errors
///
/// The error from `new_transaction`, from `f`, or from `commit`.
pub fn with_read_writer<S, F, T>(store: &S, ctx: &Context, f: F) -> Result<T>
where
    S: Store + ?Sized,
    F: FnOnce(&mut S::Transaction) -> Result<T>,
{
    let mut txn = store.new_transaction(ctx)?;
    match f(&mut txn) {
        Ok(value) => {
            txn.commit(ctx)?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = txn.rollback(ctx) {
                debug!(target: "pgkv::txn", error = %rollback_err, "rollback after closure error failed");
            }
            Err(e)
        }
    }
}

/// Run `f` against a read-only snapshot
///
/// The snapshot is discarded whether or not `f` succeeds.
///
/// # Errors
///
/// The error from `new_snapshot` or from `f`; a discard failure is only
/// reported when `f` succeeded.
pub fn with_reader<S, F, T>(store: &S, ctx: &Context, f: F) -> Result<T>
where
    S: Store + ?Sized,
    F: FnOnce(&mut S::Snapshot) -> Result<T>,
{
    let mut snapshot = store.new_snapshot(ctx)?;
    let result = f(&mut snapshot);
    let discarded = snapshot.discard(ctx);
    match (result, discarded) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), discarded) => {
            if let Err(discard_err) = discarded {
                debug!(target: "pgkv::txn", error = %discard_err, "discard after closure error failed");
            }
            Err(e)
        }
    }
}
