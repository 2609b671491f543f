//! Server-side cancellation of running statements
//!
//! The synchronous client blocks the calling thread for the whole statement,
//! so a caller's [`Context`] cannot interrupt it directly. [`guarded`] runs
//! the statement while a scoped watcher thread polls the context; once the
//! context is done the watcher asks the server to cancel the statement,
//! which then fails with `57014 query_canceled`.

use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use pgkv_core::Context;
use postgres::{CancelToken, Client, NoTls};
use tracing::debug;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

struct Done {
    finished: Mutex<bool>,
    cv: Condvar,
}

/// Marks the statement finished on every exit path, including unwinding
struct FinishOnDrop<'a>(&'a Done);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.finished.lock() = true;
        self.0.cv.notify_all();
    }
}

/// Run `op` on `client`, cancelling it on the server if `ctx` becomes done
///
/// Background contexts run `op` directly.
pub(crate) fn guarded<T>(
    client: &mut Client,
    ctx: &Context,
    op: impl FnOnce(&mut Client) -> Result<T, postgres::Error>,
) -> Result<T, postgres::Error> {
    if !ctx.is_cancellable() {
        return op(client);
    }

    let token = client.cancel_token();
    let done = Done {
        finished: Mutex::new(false),
        cv: Condvar::new(),
    };
    thread::scope(|s| {
        s.spawn(|| watch(ctx, &token, &done));
        let _finish = FinishOnDrop(&done);
        op(client)
    })
}

fn watch(ctx: &Context, token: &CancelToken, done: &Done) {
    let mut finished = done.finished.lock();
    while !*finished {
        if ctx.is_done() {
            drop(finished);
            debug!(target: "pgkv::txn", "context done, cancelling running statement");
            if let Err(e) = token.cancel_query(NoTls) {
                debug!(target: "pgkv::txn", error = %e, "cancel request failed");
            }
            return;
        }
        let wait = ctx
            .remaining()
            .map_or(POLL_INTERVAL, |left| left.clamp(Duration::from_millis(1), POLL_INTERVAL));
        done.cv.wait_for(&mut finished, wait);
    }
}
