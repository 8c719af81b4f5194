//! Shape validation for configured pipelines.
//!
//! Checks the ordered stage list against the resolved stage
//! definitions: ordering rules, instance-name uniqueness, and per-type
//! lane shapes. Lane connectivity is the lane resolver's business.

use std::collections::{HashMap, HashSet};

use rillflow_types::{
    Issue, IssueCode, PipelineConfig, StageConfig, StageDefinition, StageType,
};

/// Validate the shape of a configured pipeline.
///
/// `definitions` are the stage kinds the library resolved; a configured
/// stage whose name is absent gets no type-dependent checks here (the
/// builder reports the resolution failure separately). All problems are
/// accumulated; an empty list means the shape is sound.
#[must_use]
pub fn validate_shape(config: &PipelineConfig, definitions: &[StageDefinition]) -> Vec<Issue> {
    let mut issues = Vec::new();
    let types: HashMap<&str, StageType> = definitions
        .iter()
        .map(|d| (d.name.as_str(), d.stage_type))
        .collect();

    if config.stages.is_empty() {
        issues.push(Issue::pipeline(
            IssueCode::EmptyPipeline,
            "pipeline declares no stages",
        ));
        return issues;
    }

    let mut seen = HashSet::new();
    for stage in config.stages.iter().chain(std::iter::once(&config.error_stage)) {
        if stage.instance_name.trim().is_empty() {
            issues.push(Issue::stage(
                &stage.instance_name,
                IssueCode::InvalidStageShape,
                format!("stage '{}' has an empty instance name", stage.stage_name),
            ));
        }
        if !seen.insert(stage.instance_name.as_str()) {
            issues.push(Issue::stage(
                &stage.instance_name,
                IssueCode::DuplicateInstanceName,
                format!("instance name '{}' is used twice", stage.instance_name),
            ));
        }
    }

    for (idx, stage) in config.stages.iter().enumerate() {
        let Some(&stage_type) = types.get(stage.stage_name.as_str()) else {
            continue;
        };
        if idx == 0 && stage_type != StageType::Source {
            issues.push(Issue::stage(
                &stage.instance_name,
                IssueCode::MissingSourceStage,
                format!("first stage must be a source, found {stage_type}"),
            ));
        }
        if idx > 0 && stage_type == StageType::Source {
            issues.push(Issue::stage(
                &stage.instance_name,
                IssueCode::MisplacedSourceStage,
                "a source may only appear first",
            ));
        }
        check_lane_shape(stage, stage_type, &mut issues);
    }

    let has_target = config
        .stages
        .iter()
        .any(|s| types.get(s.stage_name.as_str()) == Some(&StageType::Target));
    if !has_target {
        issues.push(Issue::pipeline(
            IssueCode::MissingTargetStage,
            "pipeline has no target stage",
        ));
    }
    if let Some(last) = config.stages.last() {
        if let Some(&last_type) = types.get(last.stage_name.as_str()) {
            if last_type != StageType::Target {
                issues.push(Issue::stage(
                    &last.instance_name,
                    IssueCode::MissingTargetStage,
                    format!("last stage must be a target, found {last_type}"),
                ));
            }
        }
    }

    if let Some(&error_type) = types.get(config.error_stage.stage_name.as_str()) {
        if error_type != StageType::Target {
            issues.push(Issue::stage(
                &config.error_stage.instance_name,
                IssueCode::InvalidStageShape,
                format!("error stage must be a target, found {error_type}"),
            ));
        }
    }
    if !config.error_stage.input_lanes.is_empty() || !config.error_stage.output_lanes.is_empty() {
        issues.push(Issue::stage(
            &config.error_stage.instance_name,
            IssueCode::InvalidStageShape,
            "error stage must not declare lanes; it is fed outside the lane graph",
        ));
    }

    issues
}

fn check_lane_shape(stage: &StageConfig, stage_type: StageType, issues: &mut Vec<Issue>) {
    let (inputs_ok, outputs_ok) = match stage_type {
        StageType::Source => (stage.input_lanes.is_empty(), !stage.output_lanes.is_empty()),
        StageType::Processor => (!stage.input_lanes.is_empty(), !stage.output_lanes.is_empty()),
        StageType::Target => (!stage.input_lanes.is_empty(), stage.output_lanes.is_empty()),
    };
    if !inputs_ok {
        issues.push(Issue::stage(
            &stage.instance_name,
            IssueCode::InvalidStageShape,
            format!(
                "{} stage declares {} input lanes",
                stage_type,
                stage.input_lanes.len()
            ),
        ));
    }
    if !outputs_ok {
        issues.push(Issue::stage(
            &stage.instance_name,
            IssueCode::InvalidStageShape,
            format!(
                "{} stage declares {} output lanes",
                stage_type,
                stage.output_lanes.len()
            ),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions() -> Vec<StageDefinition> {
        vec![
            StageDefinition::new("dev-source", "1", StageType::Source),
            StageDefinition::new("dev-processor", "1", StageType::Processor),
            StageDefinition::new("dev-target", "1", StageType::Target),
            StageDefinition::new("discard-errors", "1", StageType::Target),
        ]
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
    fn valid_linear_pipeline_has_no_issues() {
        assert!(validate_shape(&linear_config(), &definitions()).is_empty());
    }

    #[test]
    fn empty_pipeline_is_reported() {
        let mut config = linear_config();
        config.stages.clear();
        let issues = validate_shape(&config, &definitions());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::EmptyPipeline);
    }

    #[test]
    fn duplicate_instance_name_is_reported() {
        let mut config = linear_config();
        config.stages[2].instance_name = "src_1".into();
        let issues = validate_shape(&config, &definitions());
        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::DuplicateInstanceName));
    }

    #[test]
    fn first_stage_must_be_a_source() {
        let mut config = linear_config();
        config.stages.remove(0);
        let issues = validate_shape(&config, &definitions());
        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::MissingSourceStage));
    }

    #[test]
    fn misplaced_source_is_reported() {
        let mut config = linear_config();
        config.stages.push(
            StageConfig::new("src_2", "dev-source").with_output_lanes(["late"]),
        );
        let issues = validate_shape(&config, &definitions());
        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::MisplacedSourceStage
                && i.instance_name.as_deref() == Some("src_2")));
    }

    #[test]
    fn missing_target_is_reported() {
        let mut config = linear_config();
        config.stages.pop();
        config.stages[1].output_lanes.clear();
        let issues = validate_shape(&config, &definitions());
        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::MissingTargetStage));
    }

    #[test]
    fn trailing_processor_is_reported() {
        let mut config = linear_config();
        config.stages.push(
            StageConfig::new("proc_2", "dev-processor")
                .with_input_lanes(["x"])
                .with_output_lanes(["y"]),
        );
        let issues = validate_shape(&config, &definitions());
        assert!(issues
            .iter()
            .any(|i| i.code == IssueCode::MissingTargetStage
                && i.instance_name.as_deref() == Some("proc_2")));
    }

    #[test]
    fn target_with_output_lanes_is_reported() {
        let mut config = linear_config();
        config.stages[2].output_lanes = vec!["leak".into()];
        let issues = validate_shape(&config, &definitions());
        assert!(issues.iter().any(|i| i.code == IssueCode::InvalidStageShape
            && i.instance_name.as_deref() == Some("tgt_1")));
    }

    #[test]
    fn error_stage_with_lanes_is_reported() {
        let mut config = linear_config();
        config.error_stage.input_lanes = vec!["nope".into()];
        let issues = validate_shape(&config, &definitions());
        assert!(issues.iter().any(|i| i.code == IssueCode::InvalidStageShape
            && i.instance_name.as_deref() == Some("errors")));
    }

    #[test]
    fn unresolved_stage_skips_type_checks() {
        let mut config = linear_config();
        config.stages[1].stage_name = "unknown-kind".into();
        // Shape stays silent about the unknown stage; resolution
        // failures are the builder's report.
        let issues = validate_shape(&config, &definitions());
        assert!(issues.is_empty());
    }
}
