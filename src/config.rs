use crate::error::{BridgeError, BridgeResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for one analytics engine invocation.
///
/// Loaded once, validated, then handed to the session which never mutates it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProcessConfig {
    pub job_id: String,
    /// Number of rows the engine should expect on the data channel.
    #[serde(default)]
    pub rows: u64,
    /// Number of analysed columns, excluding the control column.
    #[serde(default)]
    pub cols: u32,
    /// Memory limit in bytes.
    pub memory_limit: u64,
    #[serde(default = "default_threads")]
    pub threads: u32,
    #[serde(default = "default_results_field")]
    pub results_field: String,
    #[serde(default)]
    pub categorical_fields: Vec<String>,
    pub analysis: AnalysisConfig,
}

/// The analysis the engine runs, with its engine-specific parameters.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AnalysisConfig {
    pub name: String,
    #[serde(default = "default_parameters")]
    pub parameters: serde_json::Value,
}

fn default_threads() -> u32 {
    1
}

fn default_results_field() -> String {
    "ml".to_string()
}

fn default_parameters() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ProcessConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.job_id.trim().is_empty() {
            return Err(BridgeError::invalid_argument("job_id must not be empty"));
        }
        if self.analysis.name.trim().is_empty() {
            return Err(BridgeError::invalid_argument(format!(
                "[{}] analysis name must not be empty",
                self.job_id
            )));
        }
        if self.threads == 0 {
            return Err(BridgeError::invalid_argument(format!(
                "[{}] threads must be > 0",
                self.job_id
            )));
        }
        if self.memory_limit == 0 {
            return Err(BridgeError::invalid_argument(format!(
                "[{}] memory_limit must be > 0",
                self.job_id
            )));
        }
        if self.results_field.is_empty() {
            return Err(BridgeError::invalid_argument(format!(
                "[{}] results_field must not be empty",
                self.job_id
            )));
        }
        Ok(())
    }

    /// Renders the JSON document the engine reads at start-up.
    pub fn to_engine_json(&self) -> serde_json::Value {
        serde_json::json!({
            "job_id": self.job_id,
            "rows": self.rows,
            "cols": self.cols,
            "memory_limit": self.memory_limit,
            "threads": self.threads,
            "results_field": self.results_field,
            "categorical_fields": self.categorical_fields,
            "analysis": {
                "name": self.analysis.name,
                "parameters": self.analysis.parameters,
            }
        })
    }

    /// Writes the engine config into `dir` under a unique file name.
    ///
    /// The returned path should be registered with the session so the file is
    /// removed when the session closes.
    pub fn write_engine_config(&self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config dir: {}", dir.display()))?;
        let path = dir.join(format!("analytics_config_{}.json", uuid::Uuid::new_v4()));
        let content = serde_json::to_string(&self.to_engine_json())?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write engine config: {}", path.display()))?;
        Ok(path)
    }
}

/// Holds the validated configuration for the lifetime of a session.
///
/// There are no mutators: the only way to change the configuration is to
/// start a new session.
#[derive(Debug, Clone)]
pub struct ConfigHolder {
    config: ProcessConfig,
}

impl ConfigHolder {
    /// Fails with `InvalidArgument` when no configuration was supplied or the
    /// supplied one does not validate.
    pub fn new(config: Option<ProcessConfig>) -> BridgeResult<Self> {
        let config =
            config.ok_or_else(|| BridgeError::invalid_argument("process config is required"))?;
        config.validate()?;
        Ok(Self { config })
    }

    pub fn get(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn job_id(&self) -> &str {
        &self.config.job_id
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
