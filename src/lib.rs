//! # Lineage - Academic genealogy collector
//!
//! Scrapes biographical and advisor-lineage records from the Mathematics
//! Genealogy Project and persists them into SQLite.
//!
//! Lineage provides:
//! - A typed-record persistence engine: metadata-driven insert/update/skip
//!   decisions per record, with nested records persisted as foreign keys
//! - An explicit per-type metadata registry (table name, keys, insert policy)
//! - Recursive materialization of foreign-key columns back into typed records
//! - An on-disk HTTP response cache keyed by normalized URL
//! - Page scrapers producing typed records for the engine

pub mod config;
pub mod convert;
pub mod db;
pub mod fetch;
pub mod model;
pub mod record;
pub mod registry;
pub mod scrape;

// Re-exports for convenient access
pub use db::Db;
pub use record::{FieldKind, Record, RecordType, Value};
pub use registry::{InsertPolicy, Registry};

/// Result type alias for Lineage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Lineage operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Record type not registered: {0}")]
    Unregistered(String),

    #[error("Nested record depth exceeded {0} levels (reference cycle?)")]
    DepthExceeded(usize),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Fetch error: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
