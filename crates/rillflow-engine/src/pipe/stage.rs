//! Stage pipe: the execution unit wrapping a stage runtime.

use std::sync::Arc;

use rillflow_types::{ErrorRecord, Issue, OnRecordError};

use crate::batch::{BatchMaker, PipeBatch, StageBatch};
use crate::error::PipelineError;
use crate::runtime::StageRuntime;
use crate::sampler::MemorySampler;

/// Wraps a [`StageRuntime`]; the only pipe kind that runs stage code.
pub struct StagePipe {
    runtime: StageRuntime,
    input_lanes: Vec<String>,
    output_lanes: Vec<String>,
    sampler: Arc<MemorySampler>,
}

impl StagePipe {
    pub(crate) fn new(
        runtime: StageRuntime,
        input_lanes: Vec<String>,
        output_lanes: Vec<String>,
        sampler: Arc<MemorySampler>,
    ) -> Self {
        Self {
            runtime,
            input_lanes,
            output_lanes,
            sampler,
        }
    }

    pub(crate) fn instance_name(&self) -> &str {
        self.runtime.instance_name()
    }

    pub(crate) fn input_lanes(&self) -> &[String] {
        &self.input_lanes
    }

    pub(crate) fn output_lanes(&self) -> &[String] {
        &self.output_lanes
    }

    pub(crate) fn runtime(&self) -> &StageRuntime {
        &self.runtime
    }

    pub(crate) fn init(&mut self) -> Vec<Issue> {
        self.sampler
            .register(self.runtime.instance_name(), self.runtime.memory_probe());
        self.runtime.init()
    }

    pub(crate) fn process(&mut self, batch: &mut PipeBatch) -> Result<(), PipelineError> {
        let records = match self.input_lanes.first() {
            Some(lane) => batch.take_lane(lane),
            None => Vec::new(),
        };
        let instance = self.runtime.instance_name().to_string();
        let input_count = records.len() as u64;

        let declared_lanes = self.runtime.config().output_lanes.clone();
        let mut maker = BatchMaker::new(declared_lanes.clone());
        let stage_batch = StageBatch {
            records,
            size_hint: batch.batch_size(),
        };
        self.runtime
            .execute(stage_batch, &mut maker)
            .map_err(|source| PipelineError::Stage {
                instance: instance.clone(),
                source,
            })?;

        let (mut outputs, rejected) = maker.into_parts();
        let mut output_count = 0u64;
        for (declared, internal) in declared_lanes.iter().zip(&self.output_lanes) {
            let records = outputs.remove(declared).unwrap_or_default();
            output_count += records.len() as u64;
            batch.put_lane(internal.clone(), records);
        }

        let rejected_count = rejected.len() as u64;
        if !rejected.is_empty() {
            match self.runtime.config().on_record_error {
                OnRecordError::Discard => {
                    tracing::debug!(
                        stage = %instance,
                        discarded = rejected.len(),
                        "discarded rejected records"
                    );
                }
                OnRecordError::ToError => {
                    batch.push_error_records(
                        rejected
                            .into_iter()
                            .map(|(record, error)| ErrorRecord::new(record, &instance, error)),
                    );
                }
                OnRecordError::StopPipeline => {
                    // First rejection carries the abort reason.
                    let (_, error) = rejected.into_iter().next().expect("non-empty rejects");
                    return Err(PipelineError::Stage {
                        instance,
                        source: error,
                    });
                }
            }
        }

        let ctx = self.runtime.context();
        ctx.count(&format!("stage.{instance}.input_records"), input_count);
        ctx.count(&format!("stage.{instance}.output_records"), output_count);
        ctx.count(&format!("stage.{instance}.error_records"), rejected_count);
        Ok(())
    }

    pub(crate) fn destroy(&mut self) {
        self.sampler.unregister(self.runtime.instance_name());
        self.runtime.destroy();
    }
}
