//! Engine-level error type.
//!
//! Build- and init-time problems travel as accumulated
//! [`rillflow_types::Issue`] lists, never as errors; `PipelineError`
//! covers run-time faults only.

use rillflow_types::StageError;

/// Fatal fault while running a built pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// A stage failed its execution cycle, or a rejected record
    /// escalated under a stop-pipeline policy.
    #[error("stage '{instance}' failed: {source}")]
    Stage {
        /// Instance name of the failing stage.
        instance: String,
        #[source]
        source: StageError,
    },

    /// The pipeline has no source stage to drive batches from.
    #[error("pipeline has no source stage")]
    NoSourceStage,

    /// A run was requested while another run holds the pipeline.
    #[error("pipeline is already running")]
    AlreadyRunning,

    /// Fault in the surrounding infrastructure (runner internals,
    /// offset stores, host I/O).
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}
