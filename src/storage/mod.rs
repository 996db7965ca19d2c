//! Warehouse abstractions for record persistence.
//!
//! Writes are append-only: rows are never updated, deleted or
//! deduplicated, so overlapping runs produce duplicate rows.
//!
//! ## Backends
//!
//! ```text
//! BigQueryWarehouse   production, REST + load jobs
//! LocalWarehouse      {root}/{dataset}/{table}.ndjson, for dry runs and tests
//! ```

pub mod bigquery;
pub mod local;
pub mod schema;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::Result;

// Re-export for convenience
pub use bigquery::BigQueryWarehouse;
pub use local::LocalWarehouse;
pub use schema::{ALL_TABLES, COMMENTS, POSTS, TableSchema, WarehouseRow};

/// Outcome of a create-if-absent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStatus {
    Created,
    Exists,
}

impl fmt::Display for SchemaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaStatus::Created => f.write_str("created"),
            SchemaStatus::Exists => f.write_str("exists"),
        }
    }
}

/// Metadata about a completed append.
#[derive(Debug, Clone)]
pub struct LoadMetadata {
    /// Destination table
    pub table: String,
    /// Rows appended
    pub row_count: usize,
    /// Human-readable destination (`project:dataset.table` or a path)
    pub location: String,
    /// Time the warehouse confirmed the write
    pub timestamp: DateTime<Utc>,
}

/// Trait for warehouse backends.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create the dataset unless it already exists.
    async fn ensure_dataset(&self) -> Result<SchemaStatus>;

    /// Create a table with the given schema unless it already exists.
    async fn ensure_table(&self, table: &TableSchema) -> Result<SchemaStatus>;

    /// Append rows and return once the warehouse confirms the write.
    ///
    /// Rows must already match `table` (see [`TableSchema::validate_row`]).
    async fn append(&self, table: &TableSchema, rows: &[Value]) -> Result<LoadMetadata>;
}
