//! Transaction adapter
//!
//! A pgkv transaction is one SQL transaction on one pooled session, held for
//! the transaction's whole life. [`TxnCore`] carries the shared machinery of
//! read-write [`Transaction`]s and read-only [`Snapshot`]s:
//!
//! - key validation before anything reaches the server
//! - a terminal state after commit/rollback/discard (`Closed` afterwards)
//! - failure tracking: once a statement fails the server has aborted the SQL
//!   transaction, so later statements fail with `Aborted` and commit can
//!   never report success
//! - rollback of an unfinished transaction on drop
//!
//! No operation is retried. Conflicts are reported to the caller as-is.

mod read_write;
mod snapshot;

pub use read_write::Transaction;
pub use snapshot::Snapshot;

use std::io::{Cursor, Read};
use std::sync::Arc;

use pgkv_core::key::{validate_key, validate_range};
use pgkv_core::{Context, Error, ErrorKind, KeyValidator, Result, ValueReader};
use postgres::types::ToSql;
use postgres::Client;
use r2d2::PooledConnection;
use tracing::{debug, warn};

use crate::classify::classify;
use crate::range::RangeIter;
use crate::session::SessionManager;
use crate::sql::{self, Direction, TxnMode};
use crate::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    Active,
    Committed,
    RolledBack,
}

/// First statement failure of a transaction
#[derive(Debug, Clone)]
struct Failure {
    kind: ErrorKind,
    message: String,
    sqlstate: Option<String>,
}

impl Failure {
    /// Error reported by a commit that found this failure
    fn into_commit_error(self) -> Error {
        if self.kind == ErrorKind::Conflict {
            Error::Conflict {
                reason: format!("could not commit transaction: {}", self.message),
                sqlstate: self.sqlstate,
                source: None,
            }
        } else {
            Error::Aborted {
                reason: self.message,
            }
        }
    }
}

/// Settings a transaction takes from its database
#[derive(Clone)]
pub(crate) struct TxnSettings {
    pub(crate) validator: Option<Arc<dyn KeyValidator>>,
    pub(crate) lock_timeout: std::time::Duration,
    pub(crate) fetch_size: u32,
}

pub(crate) struct TxnCore {
    session: PooledConnection<SessionManager>,
    what: &'static str,
    state: TxnState,
    failure: Option<Failure>,
    validator: Option<Arc<dyn KeyValidator>>,
    fetch_size: u32,
    next_cursor: u64,
    open_cursors: usize,
}

impl TxnCore {
    /// Open a SQL transaction on `session`
    pub(crate) fn begin(
        mut session: PooledConnection<SessionManager>,
        ctx: &Context,
        mode: TxnMode,
        settings: TxnSettings,
    ) -> Result<Self> {
        ctx.check()?;
        let what = match mode {
            TxnMode::ReadWrite => "transaction",
            TxnMode::ReadOnly => "snapshot",
        };
        let begin = sql::begin(mode, settings.lock_timeout);
        if let Err(e) = watch::guarded(&mut session.client, ctx, |c| c.batch_execute(&begin)) {
            // Part of the batch may have run; the session is in an unknown state
            session.poison();
            return Err(classify(ctx, &format!("could not begin {}", what), e));
        }
        debug!(target: "pgkv::txn", kind = what, "began");
        Ok(Self {
            session,
            what,
            state: TxnState::Active,
            failure: None,
            validator: settings.validator,
            fetch_size: settings.fetch_size,
            next_cursor: 0,
            open_cursors: 0,
        })
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state == TxnState::Active
    }

    pub(crate) fn open_cursors(&self) -> usize {
        self.open_cursors
    }

    pub(crate) fn fetch_size(&self) -> u32 {
        self.fetch_size
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    fn validate(&self, key: &[u8]) -> Result<()> {
        validate_key(key, self.validator.as_deref())
    }

    /// Fail unless statements may still be sent
    fn ensure_usable(&self) -> Result<()> {
        if self.state != TxnState::Active {
            return Err(Error::closed(self.what));
        }
        match &self.failure {
            Some(failure) => Err(Error::Aborted {
                reason: failure.message.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Run one statement, recording a failure if it fails
    pub(crate) fn run<T>(
        &mut self,
        ctx: &Context,
        context: &str,
        op: impl FnOnce(&mut Client) -> std::result::Result<T, postgres::Error>,
    ) -> Result<T> {
        ctx.check()?;
        let result = watch::guarded(&mut self.session.client, ctx, op);
        result.map_err(|e| self.fail(ctx, context, e))
    }

    /// Classify a statement error and remember the first one
    pub(crate) fn fail(&mut self, ctx: &Context, context: &str, e: postgres::Error) -> Error {
        let err = classify(ctx, context, e);
        debug!(target: "pgkv::txn", kind = self.what, error = %err, "statement failed");
        if err.kind() == ErrorKind::Unavailable {
            self.session.poison();
        }
        if self.failure.is_none() {
            self.failure = Some(Failure {
                kind: err.kind(),
                message: err.to_string(),
                sqlstate: err.sqlstate().map(str::to_string),
            });
        }
        err
    }

    pub(crate) fn get(&mut self, ctx: &Context, key: &[u8]) -> Result<ValueReader> {
        self.validate(key)?;
        self.ensure_usable()?;
        let value = self.run(ctx, "could not read key", |c| {
            c.query_opt(sql::GET, &[&key])?
                .map(|row| row.try_get::<_, Vec<u8>>(0))
                .transpose()
        })?;
        value.map(Cursor::new).ok_or(Error::NotFound)
    }

    pub(crate) fn set(&mut self, ctx: &Context, key: &[u8], value: &mut dyn Read) -> Result<()> {
        self.validate(key)?;
        self.ensure_usable()?;
        let mut buf = Vec::new();
        value.read_to_end(&mut buf)?;
        self.run(ctx, "could not write key", |c| c.execute(sql::UPSERT, &[&key, &buf]))?;
        Ok(())
    }

    pub(crate) fn delete(&mut self, ctx: &Context, key: &[u8]) -> Result<()> {
        self.validate(key)?;
        self.ensure_usable()?;
        let deleted = self.run(ctx, "could not delete key", |c| c.execute(sql::DELETE, &[&key]))?;
        if deleted == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    pub(crate) fn range(
        &mut self,
        ctx: &Context,
        begin: &[u8],
        end: &[u8],
        direction: Direction,
    ) -> Result<RangeIter<'_>> {
        validate_range(begin, end)?;
        self.ensure_usable()?;

        let name = format!("kv_cursor_{}", self.next_cursor);
        self.next_cursor += 1;
        let declare = sql::declare_cursor(&name, direction, !begin.is_empty(), !end.is_empty());
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(2);
        if !begin.is_empty() {
            params.push(&begin);
        }
        if !end.is_empty() {
            params.push(&end);
        }
        self.run(ctx, "could not open range", |c| c.execute(declare.as_str(), &params))?;
        self.open_cursors += 1;
        Ok(RangeIter::new(self, ctx.clone(), name))
    }

    /// Close a cursor opened by [`TxnCore::range`]
    pub(crate) fn close_cursor(&mut self, ctx: &Context, name: &str) -> Result<()> {
        self.open_cursors = self.open_cursors.saturating_sub(1);
        if self.failure.is_some() || !self.is_active() {
            // The server already dropped it with the aborted transaction
            return Ok(());
        }
        let close = sql::close(name);
        self.run(ctx, "could not close range", |c| c.batch_execute(&close))
    }

    /// Forget a cursor the server dropped on its own
    pub(crate) fn forget_cursor(&mut self) {
        self.open_cursors = self.open_cursors.saturating_sub(1);
    }

    pub(crate) fn commit(&mut self, ctx: &Context) -> Result<()> {
        if self.state != TxnState::Active {
            return Err(Error::closed(self.what));
        }
        if let Some(failure) = self.failure.take() {
            self.finish_rollback();
            debug!(target: "pgkv::txn", kind = self.what, "commit refused after failed statement");
            return Err(failure.into_commit_error());
        }
        ctx.check()?;

        let result = watch::guarded(&mut self.session.client, ctx, |c| c.batch_execute(sql::COMMIT));
        self.state = TxnState::Committed;
        match result {
            Ok(()) => {
                debug!(target: "pgkv::txn", kind = self.what, "committed");
                Ok(())
            }
            Err(e) => {
                let err = classify(ctx, "could not commit transaction", e);
                if !err.is_conflict() {
                    self.session.poison();
                }
                debug!(target: "pgkv::txn", kind = self.what, error = %err, "commit failed");
                Err(err)
            }
        }
    }

    /// End the SQL transaction without committing
    ///
    /// The transaction is finished whatever happens. If `ctx` is already done
    /// or ROLLBACK fails, the session is discarded from the pool, which ends
    /// the transaction on the server.
    pub(crate) fn rollback(&mut self, ctx: &Context) -> Result<()> {
        if self.state != TxnState::Active {
            return Err(Error::closed(self.what));
        }
        self.state = TxnState::RolledBack;
        if let Err(e) = ctx.check() {
            self.session.poison();
            debug!(target: "pgkv::txn", kind = self.what, error = %e, "rollback abandoned");
            return Err(e);
        }
        match watch::guarded(&mut self.session.client, ctx, |c| c.batch_execute(sql::ROLLBACK)) {
            Ok(()) => {
                debug!(target: "pgkv::txn", kind = self.what, "rolled back");
                Ok(())
            }
            Err(e) => {
                self.session.poison();
                Err(classify(ctx, "could not roll back", e))
            }
        }
    }

    /// Roll back, logging instead of returning failures
    fn finish_rollback(&mut self) {
        if let Err(e) = self.rollback(&Context::background()) {
            warn!(target: "pgkv::txn", kind = self.what, error = %e, "rollback failed");
        }
    }
}

impl Drop for TxnCore {
    fn drop(&mut self) {
        if self.state == TxnState::Active {
            debug!(target: "pgkv::txn", kind = self.what, "dropped while active, rolling back");
            self.finish_rollback();
        }
    }
}
