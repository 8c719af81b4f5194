//! Collaborator traits and handles consumed by the engine.
//!
//! The engine drives these but never implements them: stage code comes
//! from a [`StageLibrary`], the batch loop from a [`PipelineRunner`],
//! sampling sinks from an [`Observer`]. Test doubles live with the
//! integration tests.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rillflow_types::{Issue, Record, StageConfig, StageDefinition, StageError};

use crate::batch::{BatchMaker, StageBatch, StageOutput};
use crate::context::StageContext;
use crate::error::PipelineError;

/// A live stage instance: the unit of record production,
/// transformation, or consumption.
///
/// Lifecycle: `init` once, `execute` once per cycle while healthy,
/// `destroy` once. Sources receive an empty input batch and should use
/// the batch's size hint; targets receive records and emit none.
pub trait Stage: Send {
    /// Validate configuration and open resources.
    ///
    /// Returned issues are accumulated by the pipeline; an empty list
    /// means the stage is ready.
    fn init(&mut self, ctx: &StageContext) -> Vec<Issue> {
        let _ = ctx;
        Vec::new()
    }

    /// Run one execution cycle.
    ///
    /// Produced records go through `output`; per-record rejects go
    /// through [`BatchMaker::to_error`]. Returning an error aborts the
    /// current run.
    fn execute(
        &mut self,
        batch: StageBatch,
        output: &mut BatchMaker,
        ctx: &StageContext,
    ) -> Result<(), StageError>;

    /// Release resources. Must tolerate being called after a failed
    /// `init`.
    fn destroy(&mut self, ctx: &StageContext) {
        let _ = ctx;
    }
}

/// Opaque per-stage isolation resource (an isolated loading boundary,
/// a native library handle, ...), released exactly once at destroy.
pub struct IsolationHandle {
    releaser: Option<Box<dyn FnOnce() + Send>>,
}

impl IsolationHandle {
    /// A handle with nothing to release.
    #[must_use]
    pub fn none() -> Self {
        Self { releaser: None }
    }

    /// A handle that runs `release` exactly once when the owning stage
    /// runtime is destroyed.
    #[must_use]
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            releaser: Some(Box::new(release)),
        }
    }

    pub(crate) fn release(&mut self) {
        if let Some(release) = self.releaser.take() {
            release();
        }
    }
}

impl Drop for IsolationHandle {
    // A handle dropped before its stage runtime ever existed (build
    // failure) still releases.
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for IsolationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolationHandle")
            .field("pending", &self.releaser.is_some())
            .finish()
    }
}

/// Everything the library hands back for one configured stage.
pub struct LoadedStage {
    /// Static metadata for the stage kind.
    pub definition: StageDefinition,
    /// The live stage object.
    pub stage: Box<dyn Stage>,
    /// Isolation resource tied to the stage's code.
    pub isolation: IsolationHandle,
}

/// Resolves configured stages to definitions and live stage objects.
///
/// Loading and isolating stage code is entirely the library's concern;
/// the engine only calls `resolve` at build time and releases the
/// returned [`IsolationHandle`] at destroy.
pub trait StageLibrary {
    /// Resolve one configured stage.
    fn resolve(&self, config: &StageConfig) -> Result<LoadedStage, StageError>;
}

/// Optional rule-sampling sink fed by observer pipes.
///
/// Implementations must treat the records as read-only; stateful sinks
/// use interior mutability.
pub trait Observer: Send + Sync {
    /// Sample the records a stage just emitted.
    fn observe(&self, instance_name: &str, records: &[Record]);
}

/// Explicit present/absent observer capability.
///
/// Observer pipes behave identically in both states except for the
/// sampling side effect.
pub enum ObserverSlot {
    /// No observer registered; observer pipes are pure pass-throughs.
    Absent,
    /// Registered sink, shared by every observer pipe.
    Registered(Arc<dyn Observer>),
}

impl ObserverSlot {
    /// Returns `true` when a sink is registered.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        matches!(self, Self::Registered(_))
    }
}

impl Clone for ObserverSlot {
    fn clone(&self) -> Self {
        match self {
            Self::Absent => Self::Absent,
            Self::Registered(observer) => Self::Registered(Arc::clone(observer)),
        }
    }
}

impl fmt::Debug for ObserverSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("ObserverSlot::Absent"),
            Self::Registered(_) => f.write_str("ObserverSlot::Registered"),
        }
    }
}

/// Opaque counter surface handed to stage contexts.
pub trait MetricsSink: Send + Sync {
    /// Add `delta` to the named counter.
    fn count(&self, key: &str, delta: u64);
}

/// Sink that drops every metric; used for previews and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl MetricsSink for NullMetrics {
    fn count(&self, _key: &str, _delta: u64) {}
}

/// Host facts the runner supplies to stage contexts.
#[derive(Debug, Clone)]
pub struct RuntimeInfo {
    /// Directory stages may read auxiliary resources from.
    pub resources_dir: PathBuf,
}

/// External strategy that drives repeated execution cycles over the
/// pipe array.
///
/// One `run` call owns the batch loop end to end: per cycle it builds a
/// [`crate::batch::PipeBatch`], calls every pipe's `process` in array
/// order, and hands accumulated error records to the bad-records
/// handler. Timeout policy for stalling stages is the runner's business.
pub trait PipelineRunner {
    /// Whether this run is a preview (stages may skip side effects).
    fn is_preview(&self) -> bool;

    /// Counter sink shared with every stage context.
    fn metrics(&self) -> Arc<dyn MetricsSink>;

    /// Host facts for stage contexts.
    fn runtime_info(&self) -> &RuntimeInfo;

    /// Drive the batch loop until completion or a fatal fault.
    ///
    /// `overrides` carries previously captured stage outputs to replay
    /// instead of executing the matching stages (preview/debugging).
    fn run(
        &mut self,
        pipes: &mut [crate::pipe::Pipe],
        bad_records: &mut crate::bad_records::BadRecordsHandler,
        observer: ObserverSlot,
        overrides: Vec<StageOutput>,
    ) -> Result<(), PipelineError>;
}
