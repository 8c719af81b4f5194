//! Pipeline and stage configuration beans.
//!
//! [`PipelineConfig`] is the validated bean the pipeline builder
//! consumes. It is produced externally (YAML definitions, a REST
//! payload, a persisted store) and treated as immutable here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What to do with a record a stage rejects during processing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnRecordError {
    /// Drop the record silently.
    Discard,
    /// Route the record to the error stage.
    #[default]
    ToError,
    /// Abort the running pipeline.
    StopPipeline,
}

/// Pipeline execution mode, surfaced to stage contexts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Single-process execution.
    #[default]
    Standalone,
    /// Cluster execution; stages may adapt their behavior.
    Cluster,
}

/// Declared wiring and settings for one stage instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Instance name, unique within the pipeline.
    pub instance_name: String,
    /// Definition lookup key in the stage library.
    pub stage_name: String,
    /// Declared input lane names.
    #[serde(default)]
    pub input_lanes: Vec<String>,
    /// Declared output lane names.
    #[serde(default)]
    pub output_lanes: Vec<String>,
    /// Per-record error policy for this instance.
    #[serde(default)]
    pub on_record_error: OnRecordError,
    /// Opaque stage-specific settings, passed through untouched.
    #[serde(default)]
    pub config: serde_json::Value,
}

impl StageConfig {
    /// Create a config with empty lanes and default settings.
    #[must_use]
    pub fn new(instance_name: impl Into<String>, stage_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            stage_name: stage_name.into(),
            input_lanes: Vec::new(),
            output_lanes: Vec::new(),
            on_record_error: OnRecordError::default(),
            config: serde_json::Value::Null,
        }
    }

    /// Set the declared input lanes.
    #[must_use]
    pub fn with_input_lanes(mut self, lanes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.input_lanes = lanes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the declared output lanes.
    #[must_use]
    pub fn with_output_lanes(mut self, lanes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.output_lanes = lanes.into_iter().map(Into::into).collect();
        self
    }

    /// Set the per-record error policy.
    #[must_use]
    pub fn with_on_record_error(mut self, policy: OnRecordError) -> Self {
        self.on_record_error = policy;
        self
    }
}

fn default_version() -> String {
    "0".to_string()
}

/// The validated pipeline configuration bean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name.
    pub pipeline: String,
    /// Pipeline revision identifier.
    #[serde(default = "default_version")]
    pub version: String,
    /// Ordered stage configurations; producers precede consumers.
    pub stages: Vec<StageConfig>,
    /// The dedicated stage receiving records rejected elsewhere.
    pub error_stage: StageConfig,
    /// Execution mode surfaced to every stage context.
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Advisory per-stage memory limit in bytes (0 disables it).
    /// Enforcement is external; the engine only plumbs the value through.
    #[serde(default)]
    pub memory_limit_bytes: u64,
    /// Free-form runtime settings (sampler duty cycle and the like).
    #[serde(default)]
    pub settings: HashMap<String, String>,
}

impl PipelineConfig {
    /// Look up a runtime setting by key.
    #[must_use]
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// Returns `true` when the pipeline is configured for cluster mode.
    #[must_use]
    pub fn is_cluster_mode(&self) -> bool {
        self.execution_mode == ExecutionMode::Cluster
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn on_record_error_default_is_to_error() {
        assert_eq!(OnRecordError::default(), OnRecordError::ToError);
    }

    #[test]
    fn stage_config_builder_sets_lanes() {
        let cfg = StageConfig::new("parse_1", "json-parser")
            .with_input_lanes(["raw"])
            .with_output_lanes(["parsed"])
            .with_on_record_error(OnRecordError::Discard);
        assert_eq!(cfg.input_lanes, vec!["raw"]);
        assert_eq!(cfg.output_lanes, vec!["parsed"]);
        assert_eq!(cfg.on_record_error, OnRecordError::Discard);
    }

    #[test]
    fn pipeline_config_deserializes_with_defaults() {
        let json = serde_json::json!({
            "pipeline": "demo",
            "stages": [
                {"instance_name": "src_1", "stage_name": "dev-source", "output_lanes": ["out"]}
            ],
            "error_stage": {"instance_name": "errors", "stage_name": "discard-errors"}
        });
        let cfg: PipelineConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.version, "0");
        assert_eq!(cfg.execution_mode, ExecutionMode::Standalone);
        assert_eq!(cfg.memory_limit_bytes, 0);
        assert!(!cfg.is_cluster_mode());
        assert!(cfg.setting("sampler.duty_cycle").is_none());
    }

    #[test]
    fn cluster_mode_flag() {
        let json = serde_json::json!({
            "pipeline": "demo",
            "execution_mode": "cluster",
            "stages": [],
            "error_stage": {"instance_name": "errors", "stage_name": "discard-errors"}
        });
        let cfg: PipelineConfig = serde_json::from_value(json).unwrap();
        assert!(cfg.is_cluster_mode());
    }
}
