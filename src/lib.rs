//! bq-copilot - guarded BigQuery analytics agent
//!
//! Answers natural-language analytics questions by looping plan -> act ->
//! reflect -> finalize, where every model-generated SQL statement must pass a
//! safety validator and a dry-run cost gate before it touches live data.
//!
//! ## Architecture
//! ```text
//! question -> AnalystAgent (state machine)
//!               |- ReasoningClient (Gemini)        planning / finalizing
//!               |- ToolDispatcher                  acting
//!                    |- QueryExecutor -> SqlValidator -> dry run -> execute
//!                    |- SchemaInspector -> bounded SchemaSummary
//! ```
//!
//! The executor owns the only path allowed to run SQL; the validator is pure
//! and the state machine is bounded, so a misbehaving planner can waste its
//! budget but can never mutate data or scan past the cost cap.

// Core error handling
pub mod error;

// Immutable configuration threaded into constructors
pub mod config;

// SQL safety validation (pure, no I/O)
pub mod safety;

// Warehouse seam and the BigQuery REST adapter
pub mod warehouse;

// Validated, cost-gated query execution
pub mod executor;

// Bounded schema summaries
pub mod schema;

// Tool catalog and dispatch
pub mod tools;

// Reasoning collaborator interface and Gemini client
pub mod llm;

// Plan/act/reflect/finalize state machine
pub mod agent;

// Public re-exports
pub use agent::{AnalystAgent, Phase, TurnReport, TurnState};
pub use config::{AgentConfig, CopilotConfig, SafetyConfig, WarehouseConfig};
pub use error::{ConfigError, ExecutionError, LlmError};
pub use executor::{render_table, QueryExecutor, QueryRequest};
pub use llm::{Directive, GeminiClient, HistoryEntry, ReasoningClient, Role, ToolDefinition};
pub use safety::{RejectReason, SqlValidator, Verdict};
pub use schema::{SchemaInspector, SchemaSummary};
pub use tools::{tool_catalog, ToolDispatcher};
pub use warehouse::{BigQueryWarehouse, CostEstimate, QueryResult, Warehouse};
