//! Tool surface and dispatcher
//!
//! Exactly two tools are exposed to the planner: `run_sql` and
//! `inspect_schema`. The dispatcher shape-checks arguments before touching
//! the executor or inspector; an unknown tool or malformed arguments become
//! a typed `InvalidToolCall`, which the loop feeds back as an observation so
//! the planner can correct itself.

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::ExecutionError;
use crate::executor::{render_table, QueryExecutor, QueryRequest};
use crate::llm::ToolDefinition;
use crate::schema::SchemaInspector;

pub const TOOL_RUN_SQL: &str = "run_sql";
pub const TOOL_INSPECT_SCHEMA: &str = "inspect_schema";

/// The catalog advertised to the planner in the system prompt.
pub fn tool_catalog() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: TOOL_RUN_SQL.into(),
            description: "Execute a read-only BigQuery Standard SQL SELECT and return a \
                          text table. Must list explicit columns (no SELECT *), include \
                          a numeric LIMIT of at most 1000, and reference tables as \
                          `project.dataset.table`."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "The SELECT statement to run"
                    },
                    "preview_rows": {
                        "type": "integer",
                        "description": "Rows to show in the result preview (default 50)"
                    }
                },
                "required": ["sql"]
            }),
        },
        ToolDefinition {
            name: TOOL_INSPECT_SCHEMA.into(),
            description: "Describe a table in the configured dataset: the handful of \
                          fields most relevant for analysis, with their types."
                .into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "table": {
                        "type": "string",
                        "description": "Table name within the dataset, e.g. 'orders'"
                    }
                },
                "required": ["table"]
            }),
        },
    ]
}

/// Routes planner tool calls to the executor and inspector.
pub struct ToolDispatcher {
    executor: QueryExecutor,
    inspector: SchemaInspector,
}

impl ToolDispatcher {
    pub fn new(executor: QueryExecutor, inspector: SchemaInspector) -> Self {
        Self {
            executor,
            inspector,
        }
    }

    /// Dispatch one tool call, returning rendered text on success.
    pub async fn dispatch(&self, name: &str, args: &Value) -> Result<String, ExecutionError> {
        info!(tool = name, "dispatching tool call");
        match name {
            TOOL_RUN_SQL => self.run_sql(args).await,
            TOOL_INSPECT_SCHEMA => self.inspect_schema(args).await,
            other => {
                warn!(tool = other, "unknown tool requested");
                Err(ExecutionError::InvalidToolCall(format!(
                    "unknown tool `{other}`; available tools: {TOOL_RUN_SQL}, {TOOL_INSPECT_SCHEMA}"
                )))
            }
        }
    }

    /// Dispatch and fold errors into observation text. Every failure mode is
    /// something the planner should react to, never a crash.
    pub async fn observe(&self, name: &str, args: &Value) -> String {
        match self.dispatch(name, args).await {
            Ok(text) => text,
            Err(e) => format!("ERROR: {e}"),
        }
    }

    async fn run_sql(&self, args: &Value) -> Result<String, ExecutionError> {
        let sql = args
            .get("sql")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ExecutionError::InvalidToolCall("run_sql requires a string `sql` argument".into())
            })?;

        let mut request = QueryRequest::new(sql);
        if let Some(preview) = args.get("preview_rows") {
            let rows = preview.as_u64().ok_or_else(|| {
                ExecutionError::InvalidToolCall("`preview_rows` must be an integer".into())
            })?;
            request = request.with_preview(rows as usize);
        }

        let result = self.executor.execute(&request).await?;
        let row_count = result.rows.len();
        let table = render_table(&result);
        Ok(format!("{table}\n({row_count} rows shown)"))
    }

    async fn inspect_schema(&self, args: &Value) -> Result<String, ExecutionError> {
        let table = args
            .get("table")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ExecutionError::InvalidToolCall(
                    "inspect_schema requires a string `table` argument".into(),
                )
            })?;
        let summary = self.inspector.inspect(table).await?;
        Ok(summary.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SafetyConfig;
    use crate::warehouse::{Column, FieldMeta, QueryResult, Warehouse, WarehouseError};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct StubWarehouse;

    #[async_trait]
    impl Warehouse for StubWarehouse {
        async fn dry_run(&self, _sql: &str) -> Result<u64, WarehouseError> {
            Ok(4096)
        }
        async fn execute(&self, _sql: &str, _n: usize) -> Result<QueryResult, WarehouseError> {
            Ok(QueryResult {
                columns: vec![Column {
                    name: "status".into(),
                    field_type: "STRING".into(),
                }],
                rows: vec![vec![serde_json::json!("Complete")]],
                truncated: false,
            })
        }
        async fn table_schema(&self, table: &str) -> Result<Vec<FieldMeta>, WarehouseError> {
            if table == "orders" {
                Ok(vec![FieldMeta {
                    name: "order_id".into(),
                    field_type: "INTEGER".into(),
                    mode: "NULLABLE".into(),
                    description: String::new(),
                }])
            } else {
                Err(WarehouseError::NotFound(table.to_string()))
            }
        }
        async fn list_tables(&self) -> Result<Vec<String>, WarehouseError> {
            Ok(vec!["orders".into()])
        }
    }

    fn dispatcher() -> ToolDispatcher {
        let warehouse: Arc<dyn Warehouse> = Arc::new(StubWarehouse);
        ToolDispatcher::new(
            QueryExecutor::new(warehouse.clone(), SafetyConfig::default()),
            SchemaInspector::new(warehouse),
        )
    }

    #[tokio::test]
    async fn unknown_tool_is_invalid_call() {
        let err = dispatcher()
            .dispatch("drop_tables", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidToolCall(_)));
    }

    #[tokio::test]
    async fn run_sql_requires_sql_argument() {
        let err = dispatcher()
            .dispatch(TOOL_RUN_SQL, &serde_json::json!({"query": "SELECT 1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidToolCall(_)));
    }

    #[tokio::test]
    async fn run_sql_rejects_non_integer_preview() {
        let err = dispatcher()
            .dispatch(
                TOOL_RUN_SQL,
                &serde_json::json!({"sql": "SELECT a FROM `p.d.t` LIMIT 5", "preview_rows": "ten"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidToolCall(_)));
    }

    #[tokio::test]
    async fn run_sql_happy_path_renders_table() {
        let text = dispatcher()
            .dispatch(
                TOOL_RUN_SQL,
                &serde_json::json!({"sql": "SELECT status FROM `p.d.orders` LIMIT 10"}),
            )
            .await
            .unwrap();
        assert!(text.contains("status"));
        assert!(text.contains("Complete"));
        assert!(text.contains("(1 rows shown)"));
    }

    #[tokio::test]
    async fn inspect_schema_requires_table_argument() {
        let err = dispatcher()
            .dispatch(TOOL_INSPECT_SCHEMA, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidToolCall(_)));
    }

    #[tokio::test]
    async fn observe_folds_errors_into_text() {
        let text = dispatcher()
            .observe(TOOL_INSPECT_SCHEMA, &serde_json::json!({"table": "ghosts"}))
            .await;
        assert!(text.starts_with("ERROR:"));
        assert!(text.contains("ghosts"));
    }

    #[test]
    fn catalog_exposes_exactly_two_tools() {
        let catalog = tool_catalog();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog[0].name, TOOL_RUN_SQL);
        assert_eq!(catalog[1].name, TOOL_INSPECT_SCHEMA);
        // every tool documents its argument schema
        for tool in catalog {
            assert!(tool.parameters.get("properties").is_some());
        }
    }
}
