//! Error types for the copilot core
//!
//! Typed errors using thiserror so the orchestration layer can relay an
//! actionable message for every failure mode instead of an opaque fault.

use thiserror::Error;

use crate::safety::RejectReason;

/// Errors produced by the query executor, schema inspector, and tool dispatcher.
///
/// Every variant here is recoverable at the reflect boundary: the agent loop
/// converts it into an observation string and hands it back to the planner.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The safety validator refused the SQL before any warehouse contact.
    #[error("query rejected ({reason}): {detail}")]
    Rejected {
        reason: RejectReason,
        detail: String,
    },

    /// Dry run projected a scan above the configured byte ceiling.
    #[error("query would scan {bytes} bytes, exceeding the cap of {cap}")]
    CostExceeded { bytes: u64, cap: u64 },

    /// The warehouse refused to estimate the query (typically a syntax error).
    #[error("dry run failed: {0}")]
    Estimation(String),

    /// The warehouse accepted the query but execution failed.
    #[error("warehouse execution failed: {0}")]
    Warehouse(String),

    /// Unknown tool name or malformed tool arguments from the planner.
    #[error("invalid tool call: {0}")]
    InvalidToolCall(String),

    /// The requested table does not exist in the configured dataset.
    #[error("table not found: {0}")]
    SchemaNotFound(String),
}

/// Errors from the reasoning collaborator transport and protocol.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("missing or empty API key")]
    Authentication,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The planner produced neither a tool call nor a final answer.
    /// Surfaced to the loop as an observation, not a crash.
    #[error("planner protocol violation: {0}")]
    Protocol(String),
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[error("missing required setting: {0}")]
    Missing(&'static str),
}
