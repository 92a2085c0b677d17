//! Query executor
//!
//! The only code path allowed to run planner SQL against live data. Order is
//! strict: validate, then dry-run under the byte cap, then execute with a
//! bounded row count. A rejected query never contacts the warehouse and a
//! too-expensive query never reaches the execute call. No automatic retries;
//! a rejected query is the planner's problem to fix, not ours.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SafetyConfig;
use crate::error::ExecutionError;
use crate::safety::{self, SqlValidator, Verdict};
use crate::warehouse::{CostEstimate, QueryResult, Warehouse, WarehouseError};

/// A single query submission. The SQL text is immutable once submitted.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub sql: String,
    /// Rows to render into the observation; defaults to the configured
    /// preview ceiling, never exceeds the declared LIMIT.
    pub preview_rows: Option<usize>,
}

impl QueryRequest {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            preview_rows: None,
        }
    }

    pub fn with_preview(mut self, rows: usize) -> Self {
        self.preview_rows = Some(rows);
        self
    }
}

/// Validated, cost-gated query execution against one warehouse.
pub struct QueryExecutor {
    warehouse: Arc<dyn Warehouse>,
    validator: SqlValidator,
    safety: SafetyConfig,
}

impl QueryExecutor {
    pub fn new(warehouse: Arc<dyn Warehouse>, safety: SafetyConfig) -> Self {
        Self {
            warehouse,
            validator: SqlValidator::new(&safety),
            safety,
        }
    }

    /// Run the full gate sequence and return a bounded result set.
    pub async fn execute(&self, request: &QueryRequest) -> Result<QueryResult, ExecutionError> {
        if let Verdict::Rejected { reason, detail } = self.validator.validate(&request.sql) {
            return Err(ExecutionError::Rejected { reason, detail });
        }

        let estimate = self.estimate(&request.sql).await?;
        if estimate.exceeds_cap {
            warn!(
                bytes = estimate.bytes_scanned,
                cap = self.safety.scan_cap_bytes,
                "refusing query above scan cap"
            );
            return Err(ExecutionError::CostExceeded {
                bytes: estimate.bytes_scanned,
                cap: self.safety.scan_cap_bytes,
            });
        }

        let max_rows = self.row_budget(request);
        info!(
            bytes = estimate.bytes_scanned,
            max_rows, "query passed safety gates, executing"
        );

        self.warehouse
            .execute(&request.sql, max_rows)
            .await
            .map_err(|e| ExecutionError::Warehouse(e.to_string()))
    }

    /// Dry-run the SQL and compare against the configured cap. The flag is
    /// advisory; `execute` makes the final call.
    pub async fn estimate(&self, sql: &str) -> Result<CostEstimate, ExecutionError> {
        let bytes_scanned = self.warehouse.dry_run(sql).await.map_err(|e| match e {
            WarehouseError::BadRequest(msg) => ExecutionError::Estimation(msg),
            other => ExecutionError::Estimation(other.to_string()),
        })?;
        Ok(CostEstimate {
            bytes_scanned,
            exceeds_cap: bytes_scanned > self.safety.scan_cap_bytes,
        })
    }

    /// Smaller of the declared LIMIT and the preview ceiling. The preview can
    /// be raised per request but never past the row cap.
    fn row_budget(&self, request: &QueryRequest) -> usize {
        let preview = request
            .preview_rows
            .unwrap_or(self.safety.preview_rows)
            .clamp(1, self.safety.row_limit_cap as usize);
        match safety::declared_limit(&request.sql) {
            Some(limit) => preview.min(limit as usize),
            None => preview,
        }
    }
}

/// Render a result set as an aligned text table: integers with thousands
/// separators, floats with two decimals, long strings trimmed to 40 chars.
pub fn render_table(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return "(no columns)".to_string();
    }

    let mut cells: Vec<Vec<String>> = Vec::with_capacity(result.rows.len());
    for row in &result.rows {
        let mut line = Vec::with_capacity(result.columns.len());
        for (i, col) in result.columns.iter().enumerate() {
            let raw = row.get(i).cloned().unwrap_or(serde_json::Value::Null);
            line.push(format_cell(&raw, &col.field_type));
        }
        cells.push(line);
    }

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.name.len()).collect();
    for line in &cells {
        for (i, cell) in line.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut out = String::new();
    for (i, col) in result.columns.iter().enumerate() {
        if i > 0 {
            out.push_str("  ");
        }
        out.push_str(&format!("{:<width$}", col.name, width = widths[i]));
    }
    out.push('\n');
    for (i, w) in widths.iter().enumerate() {
        if i > 0 {
            out.push_str("  ");
        }
        out.push_str(&"-".repeat(*w));
    }
    for line in &cells {
        out.push('\n');
        for (i, cell) in line.iter().enumerate() {
            if i > 0 {
                out.push_str("  ");
            }
            out.push_str(&format!("{:<width$}", cell, width = widths[i]));
        }
    }

    if result.rows.is_empty() {
        out.push_str("\n(no rows)");
    }
    if result.truncated {
        out.push_str("\n... (truncated)");
    }
    out
}

fn format_cell(value: &serde_json::Value, field_type: &str) -> String {
    let raw = match value {
        serde_json::Value::Null => return "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    match field_type.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT64" => raw
            .parse::<i64>()
            .map(group_thousands)
            .unwrap_or(raw),
        "FLOAT" | "FLOAT64" | "NUMERIC" | "BIGNUMERIC" => raw
            .parse::<f64>()
            .map(|f| {
                let formatted = format!("{f:.2}");
                match formatted.split_once('.') {
                    Some((whole, frac)) => {
                        let grouped = whole
                            .parse::<i64>()
                            .map(group_thousands)
                            .unwrap_or_else(|_| whole.to_string());
                        format!("{grouped}.{frac}")
                    }
                    None => formatted,
                }
            })
            .unwrap_or(raw),
        _ => {
            if raw.chars().count() > 40 {
                raw.chars().take(40).collect()
            } else {
                raw
            }
        }
    }
}

fn group_thousands(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if n < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}
