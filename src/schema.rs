//! Schema inspector
//!
//! Fetches table metadata and condenses it to a handful of analytically
//! relevant fields. The planner never sees the raw metadata blob: the
//! [`SchemaSummary`] type carries only field name, type, and a generated
//! relevance note, and its constructor enforces the field budget. That keeps
//! the reasoning context small and removes table descriptions (free text we
//! do not control) from the prompt surface.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::ExecutionError;
use crate::warehouse::{FieldMeta, Warehouse, WarehouseError};

/// Most fields a summary may carry.
pub const MAX_SUMMARY_FIELDS: usize = 6;
/// Fewest fields a summary aims for when the table has that many.
pub const MIN_SUMMARY_FIELDS: usize = 3;

/// One selected field with a one-line rationale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNote {
    pub name: String,
    pub field_type: String,
    pub note: &'static str,
}

/// Compact structural description of a table. Bounded by construction:
/// at most [`MAX_SUMMARY_FIELDS`] fields, never the raw warehouse payload.
#[derive(Debug, Clone)]
pub struct SchemaSummary {
    table: String,
    fields: Vec<FieldNote>,
}

impl SchemaSummary {
    fn new(table: String, mut fields: Vec<FieldNote>) -> Self {
        fields.truncate(MAX_SUMMARY_FIELDS);
        Self { table, fields }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn fields(&self) -> &[FieldNote] {
        &self.fields
    }

    /// Render for the planner's observation.
    pub fn render(&self) -> String {
        let mut out = format!("Table `{}` - key fields:", self.table);
        for f in &self.fields {
            out.push_str(&format!("\n  {} ({}): {}", f.name, f.field_type, f.note));
        }
        out
    }
}

/// Selects the fields most relevant to typical analytical use.
pub struct SchemaInspector {
    warehouse: Arc<dyn Warehouse>,
}

impl SchemaInspector {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self { warehouse }
    }

    /// Fetch metadata and return the bounded summary.
    pub async fn inspect(&self, table: &str) -> Result<SchemaSummary, ExecutionError> {
        debug!(table, "inspecting schema");
        let meta = self.warehouse.table_schema(table).await.map_err(|e| match e {
            WarehouseError::NotFound(_) => ExecutionError::SchemaNotFound(table.to_string()),
            other => ExecutionError::Warehouse(other.to_string()),
        })?;
        if meta.is_empty() {
            return Err(ExecutionError::SchemaNotFound(table.to_string()));
        }

        let selected = select_fields(&meta);
        info!(table, selected = selected.len(), total = meta.len(), "schema summarized");
        Ok(SchemaSummary::new(table.to_string(), selected))
    }
}

/// Role heuristics, most useful first. Identifiers join, timestamps filter,
/// categoricals group, monetary fields aggregate.
fn classify(field: &FieldMeta) -> Option<&'static str> {
    let name = field.name.to_ascii_lowercase();
    let ty = field.field_type.to_ascii_uppercase();

    if name == "id" || name.ends_with("_id") {
        return Some("identifier, common join/filter key");
    }
    if matches!(ty.as_str(), "TIMESTAMP" | "DATE" | "DATETIME" | "TIME")
        || name.ends_with("_at")
        || name.contains("date")
    {
        return Some("timestamp, supports time-range filters and trends");
    }
    if ["status", "state", "type", "category", "country", "city", "brand", "gender", "department"]
        .iter()
        .any(|k| name.contains(k))
    {
        return Some("categorical, useful for grouping and breakdowns");
    }
    if ["price", "cost", "revenue", "sale", "amount", "total", "spend"]
        .iter()
        .any(|k| name.contains(k))
    {
        return Some("monetary measure, aggregate with SUM/AVG");
    }
    None
}

fn select_fields(meta: &[FieldMeta]) -> Vec<FieldNote> {
    let mut selected: Vec<FieldNote> = meta
        .iter()
        .filter_map(|f| {
            classify(f).map(|note| FieldNote {
                name: f.name.clone(),
                field_type: f.field_type.clone(),
                note,
            })
        })
        .take(MAX_SUMMARY_FIELDS)
        .collect();

    // Thin tables: pad with leading fields so the planner has something.
    if selected.len() < MIN_SUMMARY_FIELDS {
        for f in meta {
            if selected.len() >= MIN_SUMMARY_FIELDS {
                break;
            }
            if selected.iter().any(|s| s.name == f.name) {
                continue;
            }
            selected.push(FieldNote {
                name: f.name.clone(),
                field_type: f.field_type.clone(),
                note: "leading column, role unclassified",
            });
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::warehouse::QueryResult;

    fn field(name: &str, ty: &str) -> FieldMeta {
        FieldMeta {
            name: name.to_string(),
            field_type: ty.to_string(),
            mode: "NULLABLE".to_string(),
            description: "raw warehouse description that must not leak".to_string(),
        }
    }

    struct FixtureWarehouse {
        fields: Vec<FieldMeta>,
    }

    #[async_trait]
    impl Warehouse for FixtureWarehouse {
        async fn dry_run(&self, _sql: &str) -> Result<u64, WarehouseError> {
            Ok(0)
        }
        async fn execute(&self, _sql: &str, _n: usize) -> Result<QueryResult, WarehouseError> {
            unreachable!("inspector never executes queries")
        }
        async fn table_schema(&self, table: &str) -> Result<Vec<FieldMeta>, WarehouseError> {
            if table == "missing" {
                return Err(WarehouseError::NotFound(table.to_string()));
            }
            Ok(self.fields.clone())
        }
        async fn list_tables(&self) -> Result<Vec<String>, WarehouseError> {
            Ok(vec![])
        }
    }

    fn orders_meta() -> Vec<FieldMeta> {
        vec![
            field("order_id", "INTEGER"),
            field("user_id", "INTEGER"),
            field("status", "STRING"),
            field("gender", "STRING"),
            field("created_at", "TIMESTAMP"),
            field("returned_at", "TIMESTAMP"),
            field("shipped_at", "TIMESTAMP"),
            field("delivered_at", "TIMESTAMP"),
            field("num_of_item", "INTEGER"),
        ]
    }

    #[tokio::test]
    async fn summary_is_bounded_to_six_fields() {
        let inspector = SchemaInspector::new(Arc::new(FixtureWarehouse {
            fields: orders_meta(),
        }));
        let summary = inspector.inspect("orders").await.unwrap();
        assert!(summary.fields().len() <= MAX_SUMMARY_FIELDS);
        assert!(summary.fields().len() >= MIN_SUMMARY_FIELDS);
    }

    #[tokio::test]
    async fn raw_description_never_reaches_the_rendering() {
        let inspector = SchemaInspector::new(Arc::new(FixtureWarehouse {
            fields: orders_meta(),
        }));
        let summary = inspector.inspect("orders").await.unwrap();
        assert!(!summary.render().contains("must not leak"));
    }

    #[tokio::test]
    async fn missing_table_is_schema_not_found() {
        let inspector = SchemaInspector::new(Arc::new(FixtureWarehouse { fields: vec![] }));
        let err = inspector.inspect("missing").await.unwrap_err();
        assert!(matches!(err, ExecutionError::SchemaNotFound(_)));
    }

    #[tokio::test]
    async fn empty_schema_is_schema_not_found() {
        let inspector = SchemaInspector::new(Arc::new(FixtureWarehouse { fields: vec![] }));
        let err = inspector.inspect("hollow").await.unwrap_err();
        assert!(matches!(err, ExecutionError::SchemaNotFound(_)));
    }

    #[tokio::test]
    async fn thin_table_pads_to_minimum() {
        let inspector = SchemaInspector::new(Arc::new(FixtureWarehouse {
            fields: vec![
                field("foo", "STRING"),
                field("bar", "STRING"),
                field("baz", "STRING"),
            ],
        }));
        let summary = inspector.inspect("misc").await.unwrap();
        assert_eq!(summary.fields().len(), MIN_SUMMARY_FIELDS);
    }

    #[test]
    fn identifiers_and_timestamps_rank_as_relevant() {
        let selected = select_fields(&orders_meta());
        let names: Vec<&str> = selected.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"order_id"));
        assert!(names.contains(&"status"));
        assert!(names.contains(&"created_at"));
    }
}
