//! Application configuration
//!
//! Settings load from a YAML file (`settings/copilot.yaml` by default) and are
//! merged with CLI flag overrides, CLI winning. The resulting `CopilotConfig` is
//! immutable and threaded into the validator, executor, and agent constructors;
//! there is no ambient global configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ConfigError;

/// Default scan ceiling for dry-run gating: 1 GiB.
pub const DEFAULT_SCAN_CAP_BYTES: u64 = 1024 * 1024 * 1024;

/// Default maximum numeric LIMIT a generated query may declare.
pub const DEFAULT_ROW_LIMIT_CAP: u64 = 1000;

/// Default interactive preview ceiling (rows rendered into the observation).
pub const DEFAULT_PREVIEW_ROWS: usize = 50;

/// Default tool-call budget per turn.
pub const DEFAULT_MAX_TOOL_CALLS: u32 = 5;

/// Top-level configuration for the copilot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CopilotConfig {
    pub warehouse: WarehouseConfig,
    pub agent: AgentConfig,
    pub safety: SafetyConfig,
}

/// BigQuery connection context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    /// GCP project id used for job submission (billing project).
    pub project_id: Option<String>,
    /// Dataset all queries target, in `project.dataset` form.
    pub dataset_id: Option<String>,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            dataset_id: Some("bigquery-public-data.thelook_ecommerce".to_string()),
        }
    }
}

/// Reasoning model selection and turn budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,
    /// Secondary model tried when the primary errors out.
    pub fallback_model: String,
    pub temperature: f32,
    /// Hard bound on tool calls per turn; guarantees loop termination.
    pub max_tool_calls: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            fallback_model: "gemini-1.5-flash-8b".to_string(),
            temperature: 0.25,
            max_tool_calls: DEFAULT_MAX_TOOL_CALLS,
        }
    }
}

/// Cost and shape limits enforced on generated SQL.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Maximum LIMIT literal a query may declare.
    pub row_limit_cap: u64,
    /// Dry-run byte ceiling; queries projected above it never execute.
    pub scan_cap_bytes: u64,
    /// Rows rendered into an observation unless the planner asks for fewer.
    pub preview_rows: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            row_limit_cap: DEFAULT_ROW_LIMIT_CAP,
            scan_cap_bytes: DEFAULT_SCAN_CAP_BYTES,
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }
}

impl CopilotConfig {
    /// Load settings from a YAML file, falling back to defaults when the file
    /// is absent (a missing settings file is not an error, matching the CLI's
    /// zero-config quickstart path).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(path = %path.display(), "settings file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        info!(path = %path.display(), "settings loaded");
        Ok(config)
    }

    /// Apply CLI flag overrides. Flags always take precedence over the file.
    pub fn with_overrides(
        mut self,
        project: Option<String>,
        dataset: Option<String>,
        model: Option<String>,
    ) -> Self {
        if let Some(p) = project {
            self.warehouse.project_id = Some(p);
        }
        if let Some(d) = dataset {
            self.warehouse.dataset_id = Some(d);
        }
        if let Some(m) = model {
            self.agent.model = m;
        }
        self
    }

    /// The dataset queries must target; required before any warehouse work.
    pub fn dataset_id(&self) -> Result<&str, ConfigError> {
        self.warehouse
            .dataset_id
            .as_deref()
            .ok_or(ConfigError::Missing("warehouse.dataset_id"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = CopilotConfig::default();
        assert_eq!(cfg.safety.row_limit_cap, 1000);
        assert_eq!(cfg.safety.scan_cap_bytes, 1024 * 1024 * 1024);
        assert_eq!(cfg.agent.max_tool_calls, 5);
        assert!(cfg.dataset_id().is_ok());
    }

    #[test]
    fn cli_overrides_win() {
        let cfg = CopilotConfig::default().with_overrides(
            Some("my-project".into()),
            Some("my-project.sales".into()),
            Some("gemini-2.5-pro".into()),
        );
        assert_eq!(cfg.warehouse.project_id.as_deref(), Some("my-project"));
        assert_eq!(cfg.dataset_id().unwrap(), "my-project.sales");
        assert_eq!(cfg.agent.model, "gemini-2.5-pro");
    }

    #[test]
    fn parses_partial_yaml() {
        let yaml = r#"
safety:
  row_limit_cap: 500
agent:
  max_tool_calls: 3
"#;
        let cfg: CopilotConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.safety.row_limit_cap, 500);
        assert_eq!(cfg.agent.max_tool_calls, 3);
        // untouched sections keep defaults
        assert_eq!(cfg.safety.preview_rows, 50);
        assert_eq!(cfg.agent.model, "gemini-2.5-flash");
    }
}
