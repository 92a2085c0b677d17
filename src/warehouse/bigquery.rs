//! BigQuery REST adapter
//!
//! Implements the [`Warehouse`] trait over the BigQuery v2 REST API:
//! `jobs` with `dryRun` for cost estimates, `jobs.query` for execution, and
//! `datasets.tables` for metadata. Authentication uses an OAuth bearer token
//! from `BIGQUERY_ACCESS_TOKEN` (e.g. `gcloud auth print-access-token`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{Column, FieldMeta, QueryResult, Warehouse, WarehouseError};

const BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
const REQUEST_TIMEOUT_SECS: u64 = 60;
const QUERY_TIMEOUT_MS: u64 = 30_000;

/// BigQuery client bound to one dataset context.
#[derive(Debug, Clone)]
pub struct BigQueryWarehouse {
    client: Client,
    access_token: String,
    /// Billing project for job submission.
    project_id: String,
    /// Dataset's own project (may differ, e.g. `bigquery-public-data`).
    dataset_project: String,
    dataset: String,
}

#[derive(Debug, Deserialize)]
struct BqErrorEnvelope {
    error: BqErrorBody,
}

#[derive(Debug, Deserialize)]
struct BqErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DryRunResponse {
    statistics: DryRunStatistics,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DryRunStatistics {
    total_bytes_processed: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<BqRow>,
    total_rows: Option<String>,
    job_complete: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<BqField>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BqField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BqRow {
    #[serde(default)]
    f: Vec<BqCell>,
}

#[derive(Debug, Deserialize)]
struct BqCell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableGetResponse {
    schema: Option<TableSchema>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableListResponse {
    #[serde(default)]
    tables: Vec<TableListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableListEntry {
    table_reference: TableReference,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    table_id: String,
}

impl BigQueryWarehouse {
    /// Build a client for the given dataset context.
    ///
    /// `dataset_id` is the `project.dataset` form; `project_id` overrides the
    /// billing project when it differs from the dataset's own project.
    pub fn new(
        project_id: Option<&str>,
        dataset_id: &str,
        access_token: &str,
    ) -> Result<Self, WarehouseError> {
        if access_token.is_empty() {
            return Err(WarehouseError::InvalidResponse(
                "empty BigQuery access token".to_string(),
            ));
        }
        let (dataset_project, dataset) = dataset_id.split_once('.').ok_or_else(|| {
            WarehouseError::InvalidResponse(format!(
                "dataset id `{dataset_id}` must be in `project.dataset` form"
            ))
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        let billing = project_id.unwrap_or(dataset_project).to_string();
        info!(project = %billing, dataset = %dataset_id, "BigQuery client ready");

        Ok(Self {
            client,
            access_token: access_token.to_string(),
            project_id: billing,
            dataset_project: dataset_project.to_string(),
            dataset: dataset.to_string(),
        })
    }

    /// Create from environment (`BIGQUERY_ACCESS_TOKEN`).
    pub fn from_env(project_id: Option<&str>, dataset_id: &str) -> Result<Self, WarehouseError> {
        let token = std::env::var("BIGQUERY_ACCESS_TOKEN").map_err(|_| {
            WarehouseError::InvalidResponse(
                "BIGQUERY_ACCESS_TOKEN environment variable not set".to_string(),
            )
        })?;
        Self::new(project_id, dataset_id, &token)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, WarehouseError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<BqErrorEnvelope>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        warn!(status = %status, "BigQuery API error: {message}");
        match status.as_u16() {
            400 => Err(WarehouseError::BadRequest(message)),
            404 => Err(WarehouseError::NotFound(message)),
            code => Err(WarehouseError::Api {
                status: code,
                body: message,
            }),
        }
    }
}

fn field_meta_from(schema: Option<TableSchema>) -> Vec<FieldMeta> {
    schema
        .map(|s| {
            s.fields
                .into_iter()
                .map(|f| FieldMeta {
                    name: f.name,
                    field_type: f.field_type,
                    mode: f.mode.unwrap_or_default(),
                    description: f.description.unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Warehouse for BigQueryWarehouse {
    async fn dry_run(&self, sql: &str) -> Result<u64, WarehouseError> {
        debug!("submitting dry run");
        let url = format!("{BASE_URL}/projects/{}/jobs", self.project_id);
        let body = json!({
            "configuration": {
                "query": { "query": sql, "useLegacySql": false },
                "dryRun": true,
            }
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let parsed: DryRunResponse = response.json().await?;
        let bytes = parsed
            .statistics
            .total_bytes_processed
            .as_deref()
            .unwrap_or("0")
            .parse::<u64>()
            .map_err(|_| {
                WarehouseError::InvalidResponse("non-numeric totalBytesProcessed".to_string())
            })?;
        debug!(bytes, "dry run complete");
        Ok(bytes)
    }

    async fn execute(&self, sql: &str, max_rows: usize) -> Result<QueryResult, WarehouseError> {
        info!(max_rows, "executing query");
        let url = format!("{BASE_URL}/projects/{}/queries", self.project_id);
        let body = json!({
            "query": sql,
            "useLegacySql": false,
            "maxResults": max_rows as u64,
            "timeoutMs": QUERY_TIMEOUT_MS,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let parsed: QueryResponse = response.json().await?;
        if parsed.job_complete == Some(false) {
            return Err(WarehouseError::InvalidResponse(
                "query did not complete within the transport timeout".to_string(),
            ));
        }

        let columns: Vec<Column> = parsed
            .schema
            .map(|s| {
                s.fields
                    .into_iter()
                    .map(|f| Column {
                        name: f.name,
                        field_type: f.field_type,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let rows: Vec<Vec<Value>> = parsed
            .rows
            .into_iter()
            .map(|r| r.f.into_iter().map(|c| c.v).collect())
            .collect();

        let total: usize = parsed
            .total_rows
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(rows.len());
        let truncated = total > rows.len();

        info!(rows = rows.len(), truncated, "query finished");
        Ok(QueryResult {
            columns,
            rows,
            truncated,
        })
    }

    async fn table_schema(&self, table: &str) -> Result<Vec<FieldMeta>, WarehouseError> {
        debug!(table, "fetching table schema");
        let url = format!(
            "{BASE_URL}/projects/{}/datasets/{}/tables/{}",
            self.dataset_project, self.dataset, table
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let parsed: TableGetResponse = response.json().await?;
        let fields = field_meta_from(parsed.schema);
        debug!(table, count = fields.len(), "schema fetched");
        Ok(fields)
    }

    async fn list_tables(&self) -> Result<Vec<String>, WarehouseError> {
        let url = format!(
            "{BASE_URL}/projects/{}/datasets/{}/tables?maxResults=200",
            self.dataset_project, self.dataset
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let parsed: TableListResponse = response.json().await?;
        let mut names: Vec<String> = parsed
            .tables
            .into_iter()
            .map(|t| t.table_reference.table_id)
            .collect();
        names.sort();
        Ok(names)
    }
}
