//! Persistence layer - SQLite-backed typed-record engine
//!
//! System of record is SQLite. The engine exposes two operations upward:
//! `persist(record) -> key` and `get(type, key) -> Option<record>`; everything
//! else (table names, key columns, insert policies) comes from the metadata
//! registry the engine is constructed with.

pub mod engine;
pub mod schema;

pub use engine::{Db, DbStats};
