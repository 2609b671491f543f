//! Key validation for pgkv
//!
//! Keys are opaque, non-empty byte strings ordered lexicographically. The
//! built-in rules are fixed:
//! - Keys must not be empty (reads, writes and deletes)
//! - Range bounds may be empty (open end), but when both are present
//!   `begin <= end` must hold
//!
//! On top of that a store may be opened with a [`KeyValidator`] that rejects
//! additional keys. The validator is consulted for point operations only,
//! never for range bounds.

use crate::error::{Error, Result};

/// Optional predicate restricting which keys a store accepts
///
/// Any `Fn(&[u8]) -> bool` closure is a validator:
///
/// ```
/// use pgkv_core::key::{validate_key, KeyValidator};
///
/// let only_paths = |key: &[u8]| key.starts_with(b"/");
/// assert!(validate_key(b"/users/1", Some(&only_paths)).is_ok());
/// assert!(validate_key(b"users/1", Some(&only_paths)).is_err());
/// ```
pub trait KeyValidator: Send + Sync {
    /// Return true if `key` is acceptable
    fn is_valid(&self, key: &[u8]) -> bool;
}

impl<F> KeyValidator for F
where
    F: Fn(&[u8]) -> bool + Send + Sync,
{
    fn is_valid(&self, key: &[u8]) -> bool {
        self(key)
    }
}

/// Rejects keys longer than a byte limit
///
/// PostgreSQL cannot index B-tree entries much larger than a third of a
/// page, so stores that take arbitrary user keys usually want one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxKeyLength(pub usize);

impl KeyValidator for MaxKeyLength {
    fn is_valid(&self, key: &[u8]) -> bool {
        key.len() <= self.0
    }
}

/// Accepts only keys that start with a fixed prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequirePrefix(pub Vec<u8>);

impl KeyValidator for RequirePrefix {
    fn is_valid(&self, key: &[u8]) -> bool {
        key.starts_with(&self.0)
    }
}

/// Validate a key for a point read, write or delete
///
/// # Errors
///
/// `InvalidArgument` if the key is empty or rejected by `validator`.
pub fn validate_key(key: &[u8], validator: Option<&dyn KeyValidator>) -> Result<()> {
    if key.is_empty() {
        return Err(Error::invalid_argument("key must not be empty"));
    }
    if let Some(validator) = validator {
        if !validator.is_valid(key) {
            return Err(Error::invalid_argument(format!(
                "key {} rejected by validator",
                display_key(key)
            )));
        }
    }
    Ok(())
}

/// Validate half-open range bounds `[begin, end)`
///
/// Empty `begin` means no lower bound, empty `end` means no upper bound.
///
/// # Errors
///
/// `InvalidArgument` if both bounds are present and `begin > end`.
pub fn validate_range(begin: &[u8], end: &[u8]) -> Result<()> {
    if !begin.is_empty() && !end.is_empty() && begin > end {
        return Err(Error::invalid_argument(format!(
            "range begin {} is after end {}",
            display_key(begin),
            display_key(end)
        )));
    }
    Ok(())
}

/// True if `key` falls inside `[begin, end)` with empty bounds open
#[cfg(test)]
pub(crate) fn in_range(key: &[u8], begin: &[u8], end: &[u8]) -> bool {
    (begin.is_empty() || key >= begin) && (end.is_empty() || key < end)
}

/// Render a key for error messages and logs
///
/// Printable ASCII is shown as-is, everything else escaped. Long keys are
/// truncated.
pub fn display_key(key: &[u8]) -> String {
    const MAX_SHOWN: usize = 64;
    let shown = &key[..key.len().min(MAX_SHOWN)];
    let mut out = String::with_capacity(shown.len() + 2);
    out.push('"');
    out.extend(shown.escape_ascii().map(char::from));
    if key.len() > MAX_SHOWN {
        out.push_str("...");
    }
    out.push('"');
    out
}
