//! Cancellation and deadline propagation
//!
//! Every operation that may block on the server takes a [`Context`]. A
//! context is cheap to clone and forms a chain: a child derived with
//! [`Context::with_cancel`] or [`Context::with_timeout`] is done as soon as
//! any ancestor is done.
//!
//! ```
//! use pgkv_core::Context;
//! use std::time::Duration;
//!
//! let (ctx, cancel) = Context::background().with_cancel();
//! let bounded = ctx.with_timeout(Duration::from_secs(5));
//! assert!(bounded.check().is_ok());
//!
//! cancel.cancel();
//! assert!(bounded.check().is_err());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Cancellation/deadline token passed into every blocking operation
///
/// The default context ([`Context::background`]) is never done and costs
/// nothing to check.
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Option<Arc<Node>>,
}

#[derive(Debug)]
struct Node {
    parent: Option<Arc<Node>>,
    deadline: Option<Instant>,
    cancelled: AtomicBool,
}

impl Node {
    fn ancestors(self: &Arc<Self>) -> impl Iterator<Item = &Node> {
        std::iter::successors(Some(&**self), |n| n.parent.as_deref())
    }
}

/// Cancels the [`Context`] it was created with, and all of its children
#[derive(Debug, Clone)]
pub struct CancelHandle {
    node: Arc<Node>,
}

impl CancelHandle {
    /// Cancel the context. Idempotent.
    pub fn cancel(&self) {
        self.node.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether `cancel` has been called on this handle
    pub fn is_cancelled(&self) -> bool {
        self.node.cancelled.load(Ordering::SeqCst)
    }
}

impl Context {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self::default()
    }

    fn child(&self, deadline: Option<Instant>) -> Arc<Node> {
        Arc::new(Node {
            parent: self.inner.clone(),
            deadline,
            cancelled: AtomicBool::new(false),
        })
    }

    /// Derive a child context plus a handle that cancels it
    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let node = self.child(None);
        (
            Context {
                inner: Some(Arc::clone(&node)),
            },
            CancelHandle { node },
        )
    }

    /// Derive a child context that expires at `deadline`
    ///
    /// An ancestor's earlier deadline still applies.
    pub fn with_deadline(&self, deadline: Instant) -> Context {
        Context {
            inner: Some(self.child(Some(deadline))),
        }
    }

    /// Derive a child context that expires after `timeout`
    pub fn with_timeout(&self, timeout: Duration) -> Context {
        self.with_deadline(Instant::now() + timeout)
    }

    /// True if this context can ever become done
    ///
    /// Background contexts return false, which lets callers skip installing
    /// watchers around blocking calls.
    pub fn is_cancellable(&self) -> bool {
        self.inner.is_some()
    }

    /// Earliest deadline along the chain
    pub fn deadline(&self) -> Option<Instant> {
        let node = self.inner.as_ref()?;
        node.ancestors().filter_map(|n| n.deadline).min()
    }

    /// Time left before the deadline; `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline()
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// The reason this context is done, if it is
    ///
    /// Cancellation takes precedence over an expired deadline.
    pub fn err(&self) -> Option<Error> {
        let node = self.inner.as_ref()?;
        if node
            .ancestors()
            .any(|n| n.cancelled.load(Ordering::SeqCst))
        {
            return Some(Error::Cancelled);
        }
        match self.deadline() {
            Some(deadline) if Instant::now() >= deadline => Some(Error::DeadlineExceeded),
            _ => None,
        }
    }

    /// Return the context error, if any
    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Whether this context is done
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }
}
