//! Storage engine for pgkv
//!
//! This crate implements the pgkv store on top of a private PostgreSQL
//! server:
//! - Database: open/connect/close, session pool, schema
//! - Transaction / Snapshot: the transaction adapter
//! - RangeIter: ordered scans over server-side cursors
//! - StoreConfig: TOML-loadable configuration
//!
//! Serializability, MVCC and conflict detection are left to PostgreSQL;
//! this crate maps its outcomes onto the pgkv error taxonomy.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod classify;
pub mod database;
pub mod range;
mod session;
mod sql;
pub mod transaction;
mod watch;

pub use database::{Database, DatabaseBuilder, StoreConfig, CONFIG_FILE_NAME};
pub use range::RangeIter;
pub use transaction::{Snapshot, Transaction};
