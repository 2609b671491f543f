//! SQL text sent to the server
//!
//! All user data lives in one table, `kv`, inside the configured logical
//! database. Keys and values are `BYTEA`; ordering of `BYTEA` is bytewise,
//! which is exactly the key order the store promises.

use std::time::Duration;

/// Create the data table if it does not exist
pub(crate) const CREATE_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS kv (key BYTEA PRIMARY KEY, value BYTEA NOT NULL)";

pub(crate) const GET: &str = "SELECT value FROM kv WHERE key = $1";

pub(crate) const UPSERT: &str = "INSERT INTO kv (key, value) VALUES ($1, $2) \
     ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value";

pub(crate) const DELETE: &str = "DELETE FROM kv WHERE key = $1";

pub(crate) const COMMIT: &str = "COMMIT";

pub(crate) const ROLLBACK: &str = "ROLLBACK";

/// Isolation flavor of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TxnMode {
    /// Serializable read-write transaction
    ReadWrite,
    /// Repeatable-read read-only snapshot
    ReadOnly,
}

/// Scan direction of a range cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Ascending,
    Descending,
}

/// Statements opening a transaction
///
/// The trailing `SELECT 1` makes the server take the transaction snapshot
/// right away instead of at the first real statement.
pub(crate) fn begin(mode: TxnMode, lock_timeout: Duration) -> String {
    let isolation = match mode {
        TxnMode::ReadWrite => "ISOLATION LEVEL SERIALIZABLE",
        TxnMode::ReadOnly => "ISOLATION LEVEL REPEATABLE READ READ ONLY",
    };
    format!(
        "BEGIN {}; SET LOCAL lock_timeout = '{}ms'; SELECT 1",
        isolation,
        lock_timeout.as_millis().max(1)
    )
}

/// Cursor over `[begin, end)`; present bounds are numbered parameters in
/// order
pub(crate) fn declare_cursor(name: &str, direction: Direction, has_begin: bool, has_end: bool) -> String {
    let mut sql = format!("DECLARE {} NO SCROLL CURSOR FOR SELECT key, value FROM kv", name);
    let mut param = 0;
    if has_begin {
        param += 1;
        sql.push_str(&format!(" WHERE key >= ${}", param));
    }
    if has_end {
        param += 1;
        let joiner = if has_begin { "AND" } else { "WHERE" };
        sql.push_str(&format!(" {} key < ${}", joiner, param));
    }
    sql.push_str(match direction {
        Direction::Ascending => " ORDER BY key ASC",
        Direction::Descending => " ORDER BY key DESC",
    });
    sql
}

pub(crate) fn fetch(name: &str, count: u32) -> String {
    format!("FETCH FORWARD {} FROM {}", count, name)
}

pub(crate) fn close(name: &str) -> String {
    format!("CLOSE {}", name)
}
