//! Bad-records handler: the dedicated stage consuming rejected records.
//!
//! Every record a stage rejects under a to-error policy ends up here at
//! the end of the cycle, already stamped with the rejecting stage and
//! error. The handler wraps the configured error stage's runtime; it
//! sits outside the pipe array and is driven directly by the runner.

use rillflow_types::{ErrorRecord, Issue};

use crate::batch::{BatchMaker, StageBatch};
use crate::error::PipelineError;
use crate::runtime::StageRuntime;

/// Drives the error stage over the rejected records of each cycle.
pub struct BadRecordsHandler {
    runtime: StageRuntime,
}

impl BadRecordsHandler {
    pub(crate) fn new(runtime: StageRuntime) -> Self {
        Self { runtime }
    }

    /// Instance name of the wrapped error stage.
    #[must_use]
    pub fn instance_name(&self) -> &str {
        self.runtime.instance_name()
    }

    /// The wrapped error stage's runtime.
    #[must_use]
    pub fn runtime(&self) -> &StageRuntime {
        &self.runtime
    }

    pub(crate) fn init(&mut self) -> Vec<Issue> {
        self.runtime.init()
    }

    /// Hand one cycle's rejected records to the error stage.
    ///
    /// Records the error stage itself rejects are logged and dropped;
    /// recursing rejects back into the handler could never terminate.
    ///
    /// # Errors
    ///
    /// Fails when the error stage fails its execution cycle.
    pub fn handle(
        &mut self,
        error_records: Vec<ErrorRecord>,
        batch_size: usize,
    ) -> Result<(), PipelineError> {
        if error_records.is_empty() {
            return Ok(());
        }
        let count = error_records.len() as u64;
        let records = error_records.into_iter().map(|e| e.record).collect();
        // The error stage is a target; it declares no output lanes.
        let mut maker = BatchMaker::new(Vec::<String>::new());
        let batch = StageBatch {
            records,
            size_hint: batch_size,
        };
        let instance = self.runtime.instance_name().to_string();
        self.runtime
            .execute(batch, &mut maker)
            .map_err(|source| PipelineError::Stage {
                instance: instance.clone(),
                source,
            })?;

        let (_, rejected) = maker.into_parts();
        if !rejected.is_empty() {
            tracing::warn!(
                stage = %instance,
                dropped = rejected.len(),
                "error stage rejected records, dropping"
            );
        }
        self.runtime
            .context()
            .count(&format!("stage.{instance}.input_records"), count);
        Ok(())
    }

    pub(crate) fn destroy(&mut self) {
        self.runtime.destroy();
    }
}
