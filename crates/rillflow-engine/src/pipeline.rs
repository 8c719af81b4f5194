//! Pipeline assembly and lifecycle.
//!
//! [`PipelineBuilder`] turns a validated [`PipelineConfig`] into a flat
//! ordered pipe array: the stage type alone decides each stage's pipe
//! sequence (source: stage, observer, multiplexer; processor: combiner,
//! stage, observer, multiplexer; target: combiner, stage), and array
//! order is execution order. [`Pipeline`] owns the built array plus the
//! bad-records handler and drives init, run, validate, and destroy.
//!
//! Build and init never short-circuit: every problem found becomes an
//! [`Issue`] and assembly keeps going, so one pass reports everything.
//! Destroy is best-effort in the other direction: every stage gets its
//! destroy call no matter what its neighbors do.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use rillflow_types::{Issue, IssueCode, PipelineConfig, StageInfo, StageType};

use crate::api::{Observer, ObserverSlot, PipelineRunner, StageLibrary};
use crate::bad_records::BadRecordsHandler;
use crate::batch::StageOutput;
use crate::config::validate_shape;
use crate::context::{StageContext, StageContextParams};
use crate::error::PipelineError;
use crate::lanes::LaneResolver;
use crate::pipe::{CombinerPipe, MultiplexerPipe, ObserverPipe, Pipe, PipeRole, StagePipe};
use crate::runtime::StageRuntime;
use crate::sampler::{MemorySampler, DEFAULT_DUTY_CYCLE};

/// Runtime setting key overriding the sampler's CPU duty cycle.
pub const SAMPLER_DUTY_CYCLE_SETTING: &str = "sampler.duty_cycle";

/// Assembles a [`Pipeline`] from a configuration and a stage library.
pub struct PipelineBuilder<'a> {
    config: &'a PipelineConfig,
    library: &'a dyn StageLibrary,
    observer: ObserverSlot,
}

impl<'a> PipelineBuilder<'a> {
    /// Create a builder; no resolution happens until [`build`].
    ///
    /// [`build`]: PipelineBuilder::build
    #[must_use]
    pub fn new(config: &'a PipelineConfig, library: &'a dyn StageLibrary) -> Self {
        Self {
            config,
            library,
            observer: ObserverSlot::Absent,
        }
    }

    /// Register a sampling observer; every observer pipe shares it.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = ObserverSlot::Registered(observer);
        self
    }

    /// Resolve, validate, and synthesize the pipe array.
    ///
    /// # Errors
    ///
    /// Returns every issue found across stage resolution, shape
    /// validation, and lane resolution; a successful build means all
    /// three passes came back clean.
    pub fn build(self, runner: &dyn PipelineRunner) -> Result<Pipeline, Vec<Issue>> {
        let mut issues = Vec::new();

        let mut loaded = Vec::with_capacity(self.config.stages.len());
        for stage in &self.config.stages {
            match self.library.resolve(stage) {
                Ok(l) => loaded.push(Some(l)),
                Err(err) => {
                    issues.push(Issue::stage(
                        &stage.instance_name,
                        IssueCode::StageResolution,
                        format!("cannot resolve stage '{}': {err}", stage.stage_name),
                    ));
                    loaded.push(None);
                }
            }
        }
        let error_loaded = match self.library.resolve(&self.config.error_stage) {
            Ok(l) => Some(l),
            Err(err) => {
                issues.push(Issue::stage(
                    &self.config.error_stage.instance_name,
                    IssueCode::StageResolution,
                    format!(
                        "cannot resolve error stage '{}': {err}",
                        self.config.error_stage.stage_name
                    ),
                ));
                None
            }
        };

        let definitions: Vec<_> = loaded
            .iter()
            .flatten()
            .chain(error_loaded.iter())
            .map(|l| l.definition.clone())
            .collect();
        issues.extend(validate_shape(self.config, &definitions));
        issues.extend(LaneResolver::new(&self.config.stages).validate());

        let error_loaded = match error_loaded {
            Some(l) if issues.is_empty() => l,
            _ => return Err(issues),
        };
        let loaded: Vec<_> = loaded.into_iter().flatten().collect();

        let duty = self
            .config
            .setting(SAMPLER_DUTY_CYCLE_SETTING)
            .and_then(|raw| raw.parse::<f64>().ok())
            .unwrap_or(DEFAULT_DUTY_CYCLE);
        let sampler = Arc::new(MemorySampler::new(duty));
        let metrics = runner.metrics();

        let stage_infos: Arc<Vec<StageInfo>> = Arc::new(
            loaded
                .iter()
                .zip(&self.config.stages)
                .chain(std::iter::once((
                    &error_loaded,
                    &self.config.error_stage,
                )))
                .map(|(l, c)| StageInfo {
                    name: l.definition.name.clone(),
                    version: l.definition.version.clone(),
                    instance_name: c.instance_name.clone(),
                })
                .collect(),
        );

        // Captures the config reference, not the builder, so the
        // builder's fields stay movable below.
        let config = self.config;
        let make_context = |instance_name: &str, stage_type: StageType| {
            StageContext::new(StageContextParams {
                pipeline_name: config.pipeline.clone(),
                revision: config.version.clone(),
                stage_infos: Arc::clone(&stage_infos),
                stage_type,
                instance_name: instance_name.to_string(),
                preview: runner.is_preview(),
                memory_limit_bytes: config.memory_limit_bytes,
                cluster_mode: config.is_cluster_mode(),
                resources_dir: runner.runtime_info().resources_dir.clone(),
                metrics: Arc::clone(&metrics),
                usage_table: sampler.usage_table(),
                memory_probe: Arc::new(AtomicU64::new(0)),
            })
        };

        let resolver = LaneResolver::new(&self.config.stages);
        let mut pipes = Vec::new();
        for (idx, (stage, stage_config)) in loaded.into_iter().zip(&config.stages).enumerate() {
            let stage_type = stage.definition.stage_type;
            let instance = stage_config.instance_name.clone();
            let context = make_context(&instance, stage_type);
            let runtime = StageRuntime::new(stage, stage_config.clone(), context);

            if stage_type != StageType::Source {
                pipes.push(Pipe::Combiner(CombinerPipe::new(
                    instance.clone(),
                    resolver.combiner_input_lanes(idx),
                    resolver.combiner_output_lanes(idx),
                )));
            }
            pipes.push(Pipe::Stage(StagePipe::new(
                runtime,
                resolver.stage_input_lanes(idx),
                resolver.stage_output_lanes(idx),
                Arc::clone(&sampler),
            )));
            if stage_type != StageType::Target {
                pipes.push(Pipe::Observer(ObserverPipe::new(
                    instance.clone(),
                    resolver.observer_input_lanes(idx),
                    resolver.observer_output_lanes(idx),
                    self.observer.clone(),
                )));
                pipes.push(Pipe::Multiplexer(MultiplexerPipe::new(
                    instance,
                    resolver.multiplexer_routes(idx),
                )));
            }
        }

        let error_context = make_context(
            &self.config.error_stage.instance_name,
            error_loaded.definition.stage_type,
        );
        let bad_records = BadRecordsHandler::new(StageRuntime::new(
            error_loaded,
            self.config.error_stage.clone(),
            error_context,
        ));

        tracing::debug!(
            pipeline = %self.config.pipeline,
            revision = %self.config.version,
            pipes = pipes.len(),
            "pipeline built"
        );
        Ok(Pipeline {
            name: self.config.pipeline.clone(),
            revision: self.config.version.clone(),
            pipes,
            bad_records,
            observer: self.observer,
            sampler,
            running: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// A built pipeline: the flat pipe array plus its bad-records handler.
pub struct Pipeline {
    name: String,
    revision: String,
    pipes: Vec<Pipe>,
    bad_records: BadRecordsHandler,
    observer: ObserverSlot,
    sampler: Arc<MemorySampler>,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("revision", &self.revision)
            .field("pipes", &self.pipes.len())
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Pipeline revision.
    #[must_use]
    pub fn revision(&self) -> &str {
        &self.revision
    }

    /// The synthesized pipe array, in execution order.
    #[must_use]
    pub fn pipes(&self) -> &[Pipe] {
        &self.pipes
    }

    /// The bad-records handler fed at the end of every cycle.
    #[must_use]
    pub fn bad_records(&self) -> &BadRecordsHandler {
        &self.bad_records
    }

    /// Whether a run currently holds the pipeline. Advisory only.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Last sampled memory usage per stage instance.
    #[must_use]
    pub fn memory_usage(&self) -> std::collections::HashMap<String, u64> {
        self.sampler.usage_table().snapshot()
    }

    /// Initialize the bad-records handler, then every pipe in array
    /// order. Never short-circuits; a failing stage contributes issues
    /// and the remaining stages still get their init call.
    pub fn init(&mut self) -> Vec<Issue> {
        let mut issues = Vec::new();

        let bad_records = &mut self.bad_records;
        match catch_unwind(AssertUnwindSafe(|| bad_records.init())) {
            Ok(found) => issues.extend(found),
            Err(panic) => issues.push(Issue::stage(
                self.bad_records.instance_name(),
                IssueCode::BadRecordsInitFailure,
                format!(
                    "error stage panicked during init: {}",
                    panic_message(&*panic)
                ),
            )),
        }

        for pipe in &mut self.pipes {
            let instance = pipe.instance_name().to_string();
            match catch_unwind(AssertUnwindSafe(|| pipe.init())) {
                Ok(found) => issues.extend(found),
                Err(panic) => issues.push(Issue::stage(
                    instance,
                    IssueCode::StageInitFailure,
                    format!("stage panicked during init: {}", panic_message(&*panic)),
                )),
            }
        }

        if issues.is_empty() {
            tracing::info!(pipeline = %self.name, "pipeline initialized");
        } else {
            tracing::warn!(
                pipeline = %self.name,
                issues = issues.len(),
                "pipeline init found issues"
            );
        }
        issues
    }

    /// Drive the batch loop through `runner` until completion or a
    /// fatal fault.
    ///
    /// # Errors
    ///
    /// Fails without touching any stage when the pipeline has no source
    /// or is already running; otherwise propagates the runner's result.
    pub fn run(&mut self, runner: &mut dyn PipelineRunner) -> Result<(), PipelineError> {
        self.run_with_overrides(runner, Vec::new())
    }

    /// [`run`], replaying captured stage outputs in place of executing
    /// the matching stages (preview and debugging).
    ///
    /// # Errors
    ///
    /// Same conditions as [`run`].
    ///
    /// [`run`]: Pipeline::run
    pub fn run_with_overrides(
        &mut self,
        runner: &mut dyn PipelineRunner,
        overrides: Vec<StageOutput>,
    ) -> Result<(), PipelineError> {
        self.source_instance()?;
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(PipelineError::AlreadyRunning);
        }
        let _guard = RunningGuard {
            flag: Arc::clone(&self.running),
        };
        tracing::info!(pipeline = %self.name, revision = %self.revision, "starting run");
        runner.run(
            &mut self.pipes,
            &mut self.bad_records,
            self.observer.clone(),
            overrides,
        )
    }

    /// Initialize then immediately destroy every stage, returning the
    /// init issues. A clean validate leaves no resources behind.
    pub fn validate(&mut self) -> Vec<Issue> {
        let issues = self.init();
        self.destroy();
        issues
    }

    /// Tear every stage down, bad-records handler first, then every
    /// pipe in order, then stop the sampler. Best-effort: a panicking
    /// stage is logged and its neighbors still get their destroy call.
    pub fn destroy(&mut self) {
        let bad_records = &mut self.bad_records;
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| bad_records.destroy())) {
            tracing::error!(
                stage = %self.bad_records.instance_name(),
                panic = %panic_message(&*panic),
                "error stage panicked during destroy"
            );
        }
        for pipe in &mut self.pipes {
            let instance = pipe.instance_name().to_string();
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| pipe.destroy())) {
                tracing::error!(
                    stage = %instance,
                    panic = %panic_message(&*panic),
                    "stage panicked during destroy"
                );
            }
        }
        self.sampler.shutdown();
        tracing::info!(pipeline = %self.name, "pipeline destroyed");
    }

    /// Static description of the pipe array for logs and tooling.
    #[must_use]
    pub fn describe(&self) -> PipelineDescription {
        PipelineDescription {
            name: self.name.clone(),
            revision: self.revision.clone(),
            pipes: self
                .pipes
                .iter()
                .map(|pipe| PipeDescription {
                    role: pipe.role(),
                    instance_name: pipe.instance_name().to_string(),
                    input_lanes: pipe.input_lanes().to_vec(),
                    output_lanes: pipe.output_lanes().to_vec(),
                })
                .collect(),
        }
    }

    /// Instance name of the source stage driving the pipeline.
    ///
    /// # Errors
    ///
    /// A built pipeline always has one; its absence means the pipe
    /// array was tampered with and surfaces as
    /// [`PipelineError::NoSourceStage`].
    pub fn source_instance(&self) -> Result<&str, PipelineError> {
        self.pipes
            .iter()
            .find_map(|pipe| {
                pipe.stage_runtime()
                    .filter(|r| r.definition().stage_type == StageType::Source)
                    .map(StageRuntime::instance_name)
            })
            .ok_or(PipelineError::NoSourceStage)
    }
}

/// Static description of a built pipeline.
#[derive(Debug, Clone)]
pub struct PipelineDescription {
    /// Pipeline name.
    pub name: String,
    /// Pipeline revision.
    pub revision: String,
    /// One entry per pipe, in execution order.
    pub pipes: Vec<PipeDescription>,
}

/// One pipe's wiring in a [`PipelineDescription`].
#[derive(Debug, Clone)]
pub struct PipeDescription {
    /// Role of the pipe.
    pub role: PipeRole,
    /// Stage instance the pipe was synthesized for.
    pub instance_name: String,
    /// Internal input lanes.
    pub input_lanes: Vec<String>,
    /// Internal output lanes.
    pub output_lanes: Vec<String>,
}

struct RunningGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        IsolationHandle, LoadedStage, MetricsSink, NullMetrics, RuntimeInfo, Stage, StageLibrary,
    };
    use crate::batch::{BatchMaker, StageBatch};
    use rillflow_types::{StageConfig, StageDefinition, StageError};
    use std::path::PathBuf;

    struct Noop;

    impl Stage for Noop {
        fn execute(
            &mut self,
            _batch: StageBatch,
            _output: &mut BatchMaker,
            _ctx: &StageContext,
        ) -> Result<(), StageError> {
            Ok(())
        }
    }

    /// Resolves `dev-source`/`dev-processor`/`dev-target`/`discard-errors`
    /// to no-op stages; everything else fails.
    struct TestLibrary;

    impl StageLibrary for TestLibrary {
        fn resolve(&self, config: &StageConfig) -> Result<LoadedStage, StageError> {
            let stage_type = match config.stage_name.as_str() {
                "dev-source" => StageType::Source,
                "dev-processor" => StageType::Processor,
                "dev-target" | "discard-errors" => StageType::Target,
                other => {
                    return Err(StageError::config(
                        "UNKNOWN_STAGE",
                        format!("no stage named '{other}'"),
                    ))
                }
            };
            Ok(LoadedStage {
                definition: StageDefinition::new(&config.stage_name, "1", stage_type),
                stage: Box::new(Noop),
                isolation: IsolationHandle::none(),
            })
        }
    }

    struct NullRunner {
        info: RuntimeInfo,
    }

    impl NullRunner {
        fn new() -> Self {
            Self {
                info: RuntimeInfo {
                    resources_dir: PathBuf::from("."),
                },
            }
        }
    }

    impl PipelineRunner for NullRunner {
        fn is_preview(&self) -> bool {
            false
        }

        fn metrics(&self) -> Arc<dyn MetricsSink> {
            Arc::new(NullMetrics)
        }

        fn runtime_info(&self) -> &RuntimeInfo {
            &self.info
        }

        fn run(
            &mut self,
            _pipes: &mut [Pipe],
            _bad_records: &mut BadRecordsHandler,
            _observer: ObserverSlot,
            _overrides: Vec<StageOutput>,
        ) -> Result<(), PipelineError> {
            Ok(())
        }
    }

    fn linear_config() -> PipelineConfig {
        serde_json::from_value(serde_json::json!({
            "pipeline": "demo",
            "stages": [
                {"instance_name": "src_1", "stage_name": "dev-source", "output_lanes": ["out1"]},
                {"instance_name": "proc_1", "stage_name": "dev-processor",
                 "input_lanes": ["out1"], "output_lanes": ["out2"]},
                {"instance_name": "tgt_1", "stage_name": "dev-target", "input_lanes": ["out2"]}
            ],
            "error_stage": {"instance_name": "errors", "stage_name": "discard-errors"}
        }))
        .unwrap()
    }

    #[test]
    fn synthesis_follows_the_type_recipe() {
        let config = linear_config();
        let pipeline = PipelineBuilder::new(&config, &TestLibrary)
            .build(&NullRunner::new())
            .unwrap();
        let roles: Vec<_> = pipeline.pipes().iter().map(Pipe::role).collect();
        assert_eq!(
            roles,
            vec![
                // source
                PipeRole::Stage,
                PipeRole::Observer,
                PipeRole::Multiplexer,
                // processor
                PipeRole::Combiner,
                PipeRole::Stage,
                PipeRole::Observer,
                PipeRole::Multiplexer,
                // target
                PipeRole::Combiner,
                PipeRole::Stage,
            ]
        );
    }

    #[test]
    fn build_accumulates_issues_across_passes() {
        let mut config = linear_config();
        config.stages[1].stage_name = "missing-kind".into();
        config.stages[2].input_lanes = vec!["ghost".into()];
        let issues = PipelineBuilder::new(&config, &TestLibrary)
            .build(&NullRunner::new())
            .unwrap_err();
        assert!(issues.iter().any(|i| i.code == IssueCode::StageResolution));
        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::UnconnectedInputLane));
        // proc_1's output lost its consumer, reported in the same pass.
        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::DanglingOutputLane));
    }

    #[test]
    fn describe_reports_unique_lane_names() {
        let config = linear_config();
        let pipeline = PipelineBuilder::new(&config, &TestLibrary)
            .build(&NullRunner::new())
            .unwrap();
        let description = pipeline.describe();
        let mut seen = std::collections::HashSet::new();
        for pipe in &description.pipes {
            for lane in &pipe.output_lanes {
                assert!(seen.insert(lane.clone()), "lane '{lane}' produced twice");
            }
        }
    }

    #[test]
    fn running_flag_tracks_the_run() {
        let config = linear_config();
        let mut pipeline = PipelineBuilder::new(&config, &TestLibrary)
            .build(&NullRunner::new())
            .unwrap();

        struct ReentrantProbe {
            info: RuntimeInfo,
            flag: Arc<AtomicBool>,
        }

        impl PipelineRunner for ReentrantProbe {
            fn is_preview(&self) -> bool {
                false
            }

            fn metrics(&self) -> Arc<dyn MetricsSink> {
                Arc::new(NullMetrics)
            }

            fn runtime_info(&self) -> &RuntimeInfo {
                &self.info
            }

            fn run(
                &mut self,
                _pipes: &mut [Pipe],
                _bad_records: &mut BadRecordsHandler,
                _observer: ObserverSlot,
                _overrides: Vec<StageOutput>,
            ) -> Result<(), PipelineError> {
                assert!(self.flag.load(Ordering::SeqCst));
                Ok(())
            }
        }

        let mut runner = ReentrantProbe {
            info: RuntimeInfo {
                resources_dir: PathBuf::from("."),
            },
            flag: Arc::clone(&pipeline.running),
        };
        assert!(pipeline.init().is_empty());
        pipeline.run(&mut runner).unwrap();
        // The flag is cleared once the run returns.
        assert!(!pipeline.is_running());

        // A held flag turns further runs away before any stage is touched.
        pipeline.running.store(true, Ordering::SeqCst);
        let err = pipeline.run(&mut NullRunner::new()).unwrap_err();
        assert!(matches!(err, PipelineError::AlreadyRunning));
        pipeline.running.store(false, Ordering::SeqCst);

        pipeline.destroy();
    }
}
