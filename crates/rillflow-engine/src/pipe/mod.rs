//! Schedulable execution units.
//!
//! A pipe is the smallest schedulable step in the execution graph:
//! a stage wrapper, an observer pass-through, a fan-out multiplexer, or
//! a merge combiner. All four share one contract — `init` returns
//! accumulated issues, `process` is synchronous and side-effect-complete
//! within a cycle, `destroy` is idempotent and never propagates.

mod combiner;
mod multiplexer;
mod observer;
mod stage;

pub use combiner::CombinerPipe;
pub use multiplexer::MultiplexerPipe;
pub use observer::ObserverPipe;
pub use stage::StagePipe;

use rillflow_types::Issue;

use crate::batch::PipeBatch;
use crate::error::PipelineError;
use crate::runtime::StageRuntime;

/// Role of a pipe in the execution graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipeRole {
    /// Wraps a stage runtime.
    Stage,
    /// Pass-through feeding the rule-sampling observer.
    Observer,
    /// One producer, many consumers.
    Multiplexer,
    /// Many producers, one consumer.
    Combiner,
}

/// One schedulable unit in the execution graph.
///
/// The variant set is closed: the synthesis recipe in the pipeline
/// builder is the only place pipes are created.
pub enum Pipe {
    /// Stage wrapper; the only variant owning a [`StageRuntime`].
    Stage(StagePipe),
    /// Observer pass-through.
    Observer(ObserverPipe),
    /// Fan-out.
    Multiplexer(MultiplexerPipe),
    /// Merge.
    Combiner(CombinerPipe),
}

impl Pipe {
    /// Role of this pipe.
    #[must_use]
    pub fn role(&self) -> PipeRole {
        match self {
            Self::Stage(_) => PipeRole::Stage,
            Self::Observer(_) => PipeRole::Observer,
            Self::Multiplexer(_) => PipeRole::Multiplexer,
            Self::Combiner(_) => PipeRole::Combiner,
        }
    }

    /// Instance name of the stage this pipe was synthesized for.
    #[must_use]
    pub fn instance_name(&self) -> &str {
        match self {
            Self::Stage(p) => p.instance_name(),
            Self::Observer(p) => p.instance_name(),
            Self::Multiplexer(p) => p.instance_name(),
            Self::Combiner(p) => p.instance_name(),
        }
    }

    /// Internal lanes this pipe consumes.
    #[must_use]
    pub fn input_lanes(&self) -> &[String] {
        match self {
            Self::Stage(p) => p.input_lanes(),
            Self::Observer(p) => p.input_lanes(),
            Self::Multiplexer(p) => p.input_lanes(),
            Self::Combiner(p) => p.input_lanes(),
        }
    }

    /// Internal lanes this pipe produces.
    #[must_use]
    pub fn output_lanes(&self) -> &[String] {
        match self {
            Self::Stage(p) => p.output_lanes(),
            Self::Observer(p) => p.output_lanes(),
            Self::Multiplexer(p) => p.output_lanes(),
            Self::Combiner(p) => p.output_lanes(),
        }
    }

    /// The owned stage runtime, present only on stage pipes.
    #[must_use]
    pub fn stage_runtime(&self) -> Option<&StageRuntime> {
        match self {
            Self::Stage(p) => Some(p.runtime()),
            _ => None,
        }
    }

    /// Initialize the pipe; non-stage pipes have nothing to set up.
    pub fn init(&mut self) -> Vec<Issue> {
        match self {
            Self::Stage(p) => p.init(),
            Self::Observer(_) | Self::Multiplexer(_) | Self::Combiner(_) => Vec::new(),
        }
    }

    /// Run one execution cycle over the batch.
    ///
    /// # Errors
    ///
    /// A stage pipe fails the run on a stage-level fault or when a
    /// rejected record escalates under a stop-pipeline policy. The
    /// other variants never fail.
    pub fn process(&mut self, batch: &mut PipeBatch) -> Result<(), PipelineError> {
        match self {
            Self::Stage(p) => p.process(batch),
            Self::Observer(p) => {
                p.process(batch);
                Ok(())
            }
            Self::Multiplexer(p) => {
                p.process(batch);
                Ok(())
            }
            Self::Combiner(p) => {
                p.process(batch);
                Ok(())
            }
        }
    }

    /// Tear the pipe down. Idempotent; never propagates.
    pub fn destroy(&mut self) {
        if let Self::Stage(p) = self {
            p.destroy();
        }
    }
}
