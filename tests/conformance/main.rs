//! Store Contract Conformance Tests
//!
//! Exercises the [`pgkv::traits::Store`] contract through generic code only,
//! so every assertion holds for any store implementation, then runs it
//! against a [`pgkv::Database`] backed by a private server.
//!
//! # Test Organization
//!
//! - `store_contract`: point operations, ranges, lifecycle, isolation
//! - `scoped`: the closure API
//! - `server`: supervision of a real server

mod common;
mod scoped;
mod server;
mod store_contract;
