//! Lane resolution: maps declared stage lanes to internal pipe lanes.
//!
//! Pure functions over the ordered stage configuration list; no I/O, no
//! state. Internal lane names derive from the producer's instance name
//! plus the declared lane name, never from array position, so rebuilds
//! of the same configuration always produce the same graph.
//!
//! Naming scheme, for declared lane `L` produced by stage `p` and
//! consumed by stage `c`:
//!
//! - stage output:        `L::p::s`
//! - observer output:     `L::p::o`
//! - multiplexer output:  `L::p::m::c` (one per consumer — fan-out)
//! - combiner output:     `c::c` (the single lane `c`'s stage pipe
//!   reads — merge)
//!
//! Declared lanes match by name equality: producer output `L` feeds
//! exactly the later stages declaring `L` among their inputs.

use rillflow_types::{Issue, IssueCode, StageConfig};

fn stage_lane(lane: &str, producer: &str) -> String {
    format!("{lane}::{producer}::s")
}

fn observer_lane(lane: &str, producer: &str) -> String {
    format!("{lane}::{producer}::o")
}

fn multiplexer_lane(lane: &str, producer: &str, consumer: &str) -> String {
    format!("{lane}::{producer}::m::{consumer}")
}

fn combiner_lane(consumer: &str) -> String {
    format!("{consumer}::c")
}

/// Resolves per-stage lane-name sets for the four pipe roles.
pub struct LaneResolver<'a> {
    stages: &'a [StageConfig],
}

impl<'a> LaneResolver<'a> {
    /// Create a resolver over an ordered stage list.
    #[must_use]
    pub fn new(stages: &'a [StageConfig]) -> Self {
        Self { stages }
    }

    /// Check every declared lane for dangling ends and duplicate
    /// producers. Undeclared dangling lanes are configuration errors,
    /// not silent no-ops.
    #[must_use]
    pub fn validate(&self) -> Vec<Issue> {
        let mut issues = Vec::new();

        for (idx, stage) in self.stages.iter().enumerate() {
            for lane in &stage.output_lanes {
                if let Some(previous) = self.producer_before(lane, idx) {
                    issues.push(Issue::stage(
                        &stage.instance_name,
                        IssueCode::DuplicateOutputLane,
                        format!(
                            "output lane '{lane}' is already produced by stage '{previous}'"
                        ),
                    ));
                } else if self.consumers_after(lane, idx).is_empty() {
                    issues.push(Issue::stage(
                        &stage.instance_name,
                        IssueCode::DanglingOutputLane,
                        format!("output lane '{lane}' has no consumer"),
                    ));
                }
            }
            for lane in &stage.input_lanes {
                if self.producer_before(lane, idx).is_none() {
                    issues.push(Issue::stage(
                        &stage.instance_name,
                        IssueCode::UnconnectedInputLane,
                        format!("input lane '{lane}' has no upstream producer"),
                    ));
                }
            }
        }

        issues
    }

    /// Lane the stage pipe reads; empty for stages without inputs.
    #[must_use]
    pub fn stage_input_lanes(&self, idx: usize) -> Vec<String> {
        let stage = &self.stages[idx];
        if stage.input_lanes.is_empty() {
            Vec::new()
        } else {
            vec![combiner_lane(&stage.instance_name)]
        }
    }

    /// Internal lanes the stage pipe writes, in declared-lane order.
    #[must_use]
    pub fn stage_output_lanes(&self, idx: usize) -> Vec<String> {
        let stage = &self.stages[idx];
        stage
            .output_lanes
            .iter()
            .map(|lane| stage_lane(lane, &stage.instance_name))
            .collect()
    }

    /// Observer input is the stage pipe's output, unchanged.
    #[must_use]
    pub fn observer_input_lanes(&self, idx: usize) -> Vec<String> {
        self.stage_output_lanes(idx)
    }

    /// Observer output lanes, parallel to the observer inputs.
    #[must_use]
    pub fn observer_output_lanes(&self, idx: usize) -> Vec<String> {
        let stage = &self.stages[idx];
        stage
            .output_lanes
            .iter()
            .map(|lane| observer_lane(lane, &stage.instance_name))
            .collect()
    }

    /// Multiplexer input is the observer's output, unchanged.
    #[must_use]
    pub fn multiplexer_input_lanes(&self, idx: usize) -> Vec<String> {
        self.observer_output_lanes(idx)
    }

    /// Fan-out routing: for each declared output lane, the internal
    /// input lane and one output lane per distinct downstream consumer.
    #[must_use]
    pub fn multiplexer_routes(&self, idx: usize) -> Vec<(String, Vec<String>)> {
        let stage = &self.stages[idx];
        stage
            .output_lanes
            .iter()
            .map(|lane| {
                let outputs = self
                    .consumers_after(lane, idx)
                    .into_iter()
                    .map(|consumer| multiplexer_lane(lane, &stage.instance_name, consumer))
                    .collect();
                (observer_lane(lane, &stage.instance_name), outputs)
            })
            .collect()
    }

    /// All multiplexer output lanes, flattened in route order.
    #[must_use]
    pub fn multiplexer_output_lanes(&self, idx: usize) -> Vec<String> {
        self.multiplexer_routes(idx)
            .into_iter()
            .flat_map(|(_, outputs)| outputs)
            .collect()
    }

    /// Merge inputs: one multiplexer lane per declared input lane, in
    /// declared order.
    #[must_use]
    pub fn combiner_input_lanes(&self, idx: usize) -> Vec<String> {
        let stage = &self.stages[idx];
        stage
            .input_lanes
            .iter()
            .filter_map(|lane| {
                self.producer_before(lane, idx)
                    .map(|producer| multiplexer_lane(lane, producer, &stage.instance_name))
            })
            .collect()
    }

    /// The single merged lane the stage pipe reads.
    #[must_use]
    pub fn combiner_output_lanes(&self, idx: usize) -> Vec<String> {
        vec![combiner_lane(&self.stages[idx].instance_name)]
    }

    /// Instance name of the stage before `idx` producing `lane`.
    /// Producers precede consumers in configuration order.
    fn producer_before(&self, lane: &str, idx: usize) -> Option<&str> {
        self.stages[..idx]
            .iter()
            .find(|s| s.output_lanes.iter().any(|l| l == lane))
            .map(|s| s.instance_name.as_str())
    }

    /// Instance names of stages after `idx` consuming `lane`, in
    /// configuration order.
    fn consumers_after(&self, lane: &str, idx: usize) -> Vec<&str> {
        self.stages[idx + 1..]
            .iter()
            .filter(|s| s.input_lanes.iter().any(|l| l == lane))
            .map(|s| s.instance_name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_stages() -> Vec<StageConfig> {
        vec![
            StageConfig::new("src_1", "dev-source").with_output_lanes(["out1"]),
            StageConfig::new("proc_1", "dev-processor")
                .with_input_lanes(["out1"])
                .with_output_lanes(["out2"]),
            StageConfig::new("tgt_1", "dev-target").with_input_lanes(["out2"]),
        ]
    }

    #[test]
    fn linear_pipeline_validates_clean() {
        let stages = linear_stages();
        let resolver = LaneResolver::new(&stages);
        assert!(resolver.validate().is_empty());
    }

    #[test]
    fn source_lane_names_derive_from_producer() {
        let stages = linear_stages();
        let resolver = LaneResolver::new(&stages);
        assert!(resolver.stage_input_lanes(0).is_empty());
        assert_eq!(resolver.stage_output_lanes(0), vec!["out1::src_1::s"]);
        assert_eq!(resolver.observer_output_lanes(0), vec!["out1::src_1::o"]);
        assert_eq!(
            resolver.multiplexer_output_lanes(0),
            vec!["out1::src_1::m::proc_1"]
        );
    }

    #[test]
    fn processor_reads_its_combined_lane() {
        let stages = linear_stages();
        let resolver = LaneResolver::new(&stages);
        assert_eq!(
            resolver.combiner_input_lanes(1),
            vec!["out1::src_1::m::proc_1"]
        );
        assert_eq!(resolver.combiner_output_lanes(1), vec!["proc_1::c"]);
        assert_eq!(resolver.stage_input_lanes(1), vec!["proc_1::c"]);
    }

    #[test]
    fn fan_out_names_one_lane_per_consumer() {
        let stages = vec![
            StageConfig::new("src_1", "dev-source").with_output_lanes(["out"]),
            StageConfig::new("tgt_a", "dev-target").with_input_lanes(["out"]),
            StageConfig::new("tgt_b", "dev-target").with_input_lanes(["out"]),
        ];
        let resolver = LaneResolver::new(&stages);
        let routes = resolver.multiplexer_routes(0);
        assert_eq!(routes.len(), 1);
        let (input, outputs) = &routes[0];
        assert_eq!(input, "out::src_1::o");
        assert_eq!(
            outputs,
            &vec![
                "out::src_1::m::tgt_a".to_string(),
                "out::src_1::m::tgt_b".to_string()
            ]
        );
        assert!(resolver.validate().is_empty());
    }

    #[test]
    fn merge_lists_one_lane_per_declared_input() {
        let stages = vec![
            StageConfig::new("src_1", "dev-source").with_output_lanes(["a", "b"]),
            StageConfig::new("tgt_1", "dev-target").with_input_lanes(["a", "b"]),
        ];
        let resolver = LaneResolver::new(&stages);
        assert_eq!(
            resolver.combiner_input_lanes(1),
            vec!["a::src_1::m::tgt_1", "b::src_1::m::tgt_1"]
        );
    }

    #[test]
    fn unconnected_input_lane_is_reported() {
        let stages = vec![
            StageConfig::new("src_1", "dev-source").with_output_lanes(["out"]),
            StageConfig::new("tgt_1", "dev-target").with_input_lanes(["out", "ghost"]),
        ];
        let resolver = LaneResolver::new(&stages);
        let issues = resolver.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::UnconnectedInputLane);
        assert_eq!(issues[0].instance_name.as_deref(), Some("tgt_1"));
        assert!(issues[0].message.contains("ghost"));
    }

    #[test]
    fn dangling_output_lane_is_reported() {
        let stages = vec![
            StageConfig::new("src_1", "dev-source").with_output_lanes(["out", "unused"]),
            StageConfig::new("tgt_1", "dev-target").with_input_lanes(["out"]),
        ];
        let resolver = LaneResolver::new(&stages);
        let issues = resolver.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::DanglingOutputLane);
        assert!(issues[0].message.contains("unused"));
    }

    #[test]
    fn duplicate_output_lane_is_reported_on_later_stage() {
        let stages = vec![
            StageConfig::new("src_1", "dev-source").with_output_lanes(["out"]),
            StageConfig::new("proc_1", "dev-processor")
                .with_input_lanes(["out"])
                .with_output_lanes(["out"]),
            StageConfig::new("tgt_1", "dev-target").with_input_lanes(["out"]),
        ];
        let resolver = LaneResolver::new(&stages);
        let issues = resolver.validate();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::DuplicateOutputLane);
        assert_eq!(issues[0].instance_name.as_deref(), Some("proc_1"));
    }

    #[test]
    fn resolution_is_deterministic_across_rebuilds() {
        let stages = linear_stages();
        let first = LaneResolver::new(&stages);
        let second = LaneResolver::new(&stages);
        for idx in 0..stages.len() {
            assert_eq!(first.stage_output_lanes(idx), second.stage_output_lanes(idx));
            assert_eq!(
                first.multiplexer_output_lanes(idx),
                second.multiplexer_output_lanes(idx)
            );
        }
    }
}
