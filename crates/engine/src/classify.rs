//! Mapping of client errors onto the pgkv error taxonomy
//!
//! | SQLSTATE | Meaning | Kind |
//! |----------|---------|------|
//! | `40001` | serialization failure | Conflict |
//! | `40P01` | deadlock detected | Conflict |
//! | `55P03` | lock not available (lock timeout) | Conflict |
//! | `57014` | query canceled, caller's context done | Cancelled |
//! | `08xxx`, `57P0x` | connection lost, server shutting down | Unavailable |
//! | anything else | | Engine |

use pgkv_core::{Context, Error};
use postgres::error::SqlState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Conflict,
    Cancelled,
    Unavailable,
    Engine,
}

fn class_of(code: Option<&SqlState>, connection_closed: bool, ctx_done: bool) -> Class {
    if connection_closed {
        return Class::Unavailable;
    }
    let Some(code) = code else {
        return Class::Engine;
    };
    if *code == SqlState::T_R_SERIALIZATION_FAILURE
        || *code == SqlState::T_R_DEADLOCK_DETECTED
        || *code == SqlState::LOCK_NOT_AVAILABLE
    {
        Class::Conflict
    } else if *code == SqlState::QUERY_CANCELED {
        if ctx_done {
            Class::Cancelled
        } else {
            Class::Engine
        }
    } else if code.code().starts_with("08") || code.code().starts_with("57P") {
        Class::Unavailable
    } else {
        Class::Engine
    }
}

/// Convert a client error raised while doing `context`
pub(crate) fn classify(ctx: &Context, context: &str, err: postgres::Error) -> Error {
    let ctx_err = ctx.err();
    let class = class_of(err.code(), err.is_closed(), ctx_err.is_some());
    let message = match err.as_db_error() {
        Some(db) => db.message().to_string(),
        None => err.to_string(),
    };
    match class {
        Class::Conflict => Error::Conflict {
            reason: format!("{}: {}", context, message),
            sqlstate: err.code().map(|c| c.code().to_string()),
            source: Some(Box::new(err)),
        },
        Class::Cancelled => ctx_err.unwrap_or(Error::Cancelled),
        Class::Unavailable => Error::Unavailable {
            reason: format!("{}: {}", context, message),
            source: Some(Box::new(err)),
        },
        Class::Engine => Error::Engine {
            context: context.to_string(),
            source: Box::new(err),
        },
    }
}

/// Convert a pool checkout/build failure
pub(crate) fn pool_error(context: &str, err: r2d2::Error) -> Error {
    Error::Unavailable {
        reason: format!("{}: {}", context, err),
        source: Some(Box::new(err)),
    }
}
