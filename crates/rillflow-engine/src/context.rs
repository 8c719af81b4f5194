//! Per-stage execution context.
//!
//! A [`StageContext`] bundles pipeline facts, host surfaces, and the
//! stage's advisory memory probe. One is built per stage at pipeline
//! build time and handed to every lifecycle call.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use rillflow_types::{StageInfo, StageType};

use crate::api::MetricsSink;
use crate::sampler::{MemoryProbe, MemoryUsageTable};

/// Execution context for one stage instance.
pub struct StageContext {
    pipeline_name: String,
    revision: String,
    stage_infos: Arc<Vec<StageInfo>>,
    stage_type: StageType,
    instance_name: String,
    preview: bool,
    memory_limit_bytes: u64,
    cluster_mode: bool,
    resources_dir: PathBuf,
    metrics: Arc<dyn MetricsSink>,
    usage_table: MemoryUsageTable,
    memory_probe: MemoryProbe,
}

/// Builder-side inputs for a context; only the pipeline builder
/// constructs these.
pub(crate) struct StageContextParams {
    pub pipeline_name: String,
    pub revision: String,
    pub stage_infos: Arc<Vec<StageInfo>>,
    pub stage_type: StageType,
    pub instance_name: String,
    pub preview: bool,
    pub memory_limit_bytes: u64,
    pub cluster_mode: bool,
    pub resources_dir: PathBuf,
    pub metrics: Arc<dyn MetricsSink>,
    pub usage_table: MemoryUsageTable,
    pub memory_probe: MemoryProbe,
}

impl StageContext {
    pub(crate) fn new(params: StageContextParams) -> Self {
        Self {
            pipeline_name: params.pipeline_name,
            revision: params.revision,
            stage_infos: params.stage_infos,
            stage_type: params.stage_type,
            instance_name: params.instance_name,
            preview: params.preview,
            memory_limit_bytes: params.memory_limit_bytes,
            cluster_mode: params.cluster_mode,
            resources_dir: params.resources_dir,
            metrics: params.metrics,
            usage_table: params.usage_table,
            memory_probe: params.memory_probe,
        }
    }

    /// Name of the owning pipeline.
    #[must_use]
    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    /// Revision of the owning pipeline.
    #[must_use]
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// Roster of every stage in the pipeline.
    #[must_use]
    pub fn stage_infos(&self) -> &[StageInfo] {
        &self.stage_infos
    }

    /// Kind of the stage this context belongs to.
    #[must_use]
    pub fn stage_type(&self) -> StageType {
        self.stage_type
    }

    /// Instance name of the stage this context belongs to.
    #[must_use]
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// Whether the current run is a preview.
    #[must_use]
    pub fn is_preview(&self) -> bool {
        self.preview
    }

    /// Whether the pipeline runs in cluster mode.
    #[must_use]
    pub fn is_cluster_mode(&self) -> bool {
        self.cluster_mode
    }

    /// Advisory memory limit in bytes; 0 means no limit configured.
    /// Enforcement is external to the engine.
    #[must_use]
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_bytes
    }

    /// Directory stages may read auxiliary resources from.
    #[must_use]
    pub fn resources_dir(&self) -> &Path {
        &self.resources_dir
    }

    /// Add `delta` to a named counter on the host metrics sink.
    pub fn count(&self, key: &str, delta: u64) {
        self.metrics.count(key, delta);
    }

    /// Report this stage's current memory footprint. The background
    /// sampler publishes it to the shared usage table on its next sweep.
    pub fn report_memory(&self, bytes: u64) {
        self.memory_probe.store(bytes, Ordering::Relaxed);
    }

    /// Last sampled memory usage of any stage in the pipeline.
    #[must_use]
    pub fn memory_usage_of(&self, instance_name: &str) -> Option<u64> {
        self.usage_table.get(instance_name)
    }

    pub(crate) fn memory_probe(&self) -> MemoryProbe {
        Arc::clone(&self.memory_probe)
    }
}
