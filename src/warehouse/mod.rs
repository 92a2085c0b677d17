//! Warehouse adapter seam
//!
//! The executor and schema inspector talk to the warehouse only through the
//! [`Warehouse`] trait, so tests can substitute counting doubles and the core
//! stays independent of the BigQuery wire format.

pub mod bigquery;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use bigquery::BigQueryWarehouse;

/// Raw column metadata as the warehouse reports it. Only the schema inspector
/// ever sees this shape; it is deliberately not serializable so the full blob
/// cannot leak into an observation.
#[derive(Debug, Clone)]
pub struct FieldMeta {
    pub name: String,
    pub field_type: String,
    pub mode: String,
    pub description: String,
}

/// A result column: name plus warehouse type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub field_type: String,
}

/// Bounded result set owned by the executor until handed to the agent loop.
#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    /// True when the warehouse had more rows than the preview ceiling allowed.
    pub truncated: bool,
}

/// Projected cost of a query, produced by a dry run. Ephemeral: computed per
/// request and consumed immediately by the executor.
#[derive(Debug, Clone, Copy)]
pub struct CostEstimate {
    pub bytes_scanned: u64,
    pub exceeds_cap: bool,
}

/// Transport and API failures from the warehouse.
#[derive(Error, Debug)]
pub enum WarehouseError {
    /// The warehouse refused the request body (typically a SQL syntax error).
    #[error("{0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("unexpected response shape: {0}")]
    InvalidResponse(String),
}

/// Read-only analytical warehouse capabilities the core relies on.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Estimate bytes scanned without executing.
    async fn dry_run(&self, sql: &str) -> Result<u64, WarehouseError>;

    /// Execute the SQL, returning at most `max_rows` rows.
    async fn execute(&self, sql: &str, max_rows: usize) -> Result<QueryResult, WarehouseError>;

    /// Full column metadata for a table in the configured dataset.
    async fn table_schema(&self, table: &str) -> Result<Vec<FieldMeta>, WarehouseError>;

    /// Table names available in the configured dataset.
    async fn list_tables(&self) -> Result<Vec<String>, WarehouseError>;
}
