//! Core types and traits for pgkv
//!
//! This crate defines the foundational pieces shared by every other pgkv
//! crate:
//! - Error: error taxonomy with a coarse [`ErrorKind`]
//! - Context: cancellation and deadline propagation
//! - Key: key validation and range bound checks
//! - Traits: generic transactional key-value capabilities (Reader, Writer, Store)
//! - Scope: closure helpers that commit or roll back automatically

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod key;
pub mod scope;
pub mod traits;

pub use context::{CancelHandle, Context};
pub use error::{BoxError, Error, ErrorKind, Result};
pub use key::{validate_key, validate_range, KeyValidator, MaxKeyLength, RequirePrefix};
pub use scope::{with_read_writer, with_reader};
pub use traits::{Entry, ReadWriter, Reader, Snapshot, Store, Transaction, ValueReader, Writer};
