//! Stage runtime: one configured stage instance bound to its definition
//! and context.
//!
//! A `StageRuntime` is owned exclusively by its stage pipe (and the
//! bad-records handler for the error stage); all lifecycle calls flow
//! through here so isolation release and destroy idempotence live in
//! one place.

use rillflow_types::{Issue, StageConfig, StageDefinition, StageError, StageInfo};

use crate::api::{IsolationHandle, LoadedStage, Stage};
use crate::batch::{BatchMaker, StageBatch};
use crate::context::StageContext;
use crate::sampler::MemoryProbe;

/// A configured stage instance bound to its type metadata and context.
pub struct StageRuntime {
    definition: StageDefinition,
    config: StageConfig,
    stage: Box<dyn Stage>,
    context: StageContext,
    isolation: IsolationHandle,
    destroyed: bool,
}

impl StageRuntime {
    pub(crate) fn new(loaded: LoadedStage, config: StageConfig, context: StageContext) -> Self {
        Self {
            definition: loaded.definition,
            config,
            stage: loaded.stage,
            context,
            isolation: loaded.isolation,
            destroyed: false,
        }
    }

    /// Static metadata of the stage kind.
    #[must_use]
    pub fn definition(&self) -> &StageDefinition {
        &self.definition
    }

    /// Declared wiring of this instance.
    #[must_use]
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Execution context handed to every lifecycle call.
    #[must_use]
    pub fn context(&self) -> &StageContext {
        &self.context
    }

    /// Configured instance name.
    #[must_use]
    pub fn instance_name(&self) -> &str {
        &self.config.instance_name
    }

    /// Per-instance info for rosters and summaries.
    #[must_use]
    pub fn info(&self) -> StageInfo {
        StageInfo {
            name: self.definition.name.clone(),
            version: self.definition.version.clone(),
            instance_name: self.config.instance_name.clone(),
        }
    }

    pub(crate) fn memory_probe(&self) -> MemoryProbe {
        self.context.memory_probe()
    }

    pub(crate) fn init(&mut self) -> Vec<Issue> {
        self.stage.init(&self.context)
    }

    pub(crate) fn execute(
        &mut self,
        batch: StageBatch,
        output: &mut BatchMaker,
    ) -> Result<(), StageError> {
        self.stage.execute(batch, output, &self.context)
    }

    /// Tear the stage down and release its isolation resource.
    ///
    /// Idempotent; a second call is a no-op. Safe to call even if
    /// `init` was never reached or failed.
    pub(crate) fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.stage.destroy(&self.context);
        self.isolation.release();
    }
}
