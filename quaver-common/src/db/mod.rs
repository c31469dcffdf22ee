//! Generic SQLite schema plumbing
//!
//! Introspection and maintenance helpers shared by any member crate that
//! owns a database file. The concrete DDL lives with the owning crate; this
//! module only knows how to inspect tables, append columns, verify file
//! integrity, and track the schema version ladder.

pub mod schema;

pub use schema::*;
