//! Validation diagnostics.
//!
//! An [`Issue`] is a structured, non-fatal diagnostic produced during
//! build, validation, or init. Issues are accumulated, never thrown;
//! their code strings are a stable surface for external tooling.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of diagnostic codes.
///
/// The string form of each code (see [`IssueCode::code`]) must stay
/// stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCode {
    /// A declared input lane has no upstream producer.
    UnconnectedInputLane,
    /// A declared output lane has no downstream consumer.
    DanglingOutputLane,
    /// Two stages declare the same output lane name.
    DuplicateOutputLane,
    /// The pipeline declares no stages.
    EmptyPipeline,
    /// Two stages share an instance name.
    DuplicateInstanceName,
    /// The first stage is not a source.
    MissingSourceStage,
    /// A source appears anywhere but first.
    MisplacedSourceStage,
    /// The pipeline has no target stage.
    MissingTargetStage,
    /// A stage's declared lanes do not match its type.
    InvalidStageShape,
    /// The stage library could not resolve a configured stage.
    StageResolution,
    /// The bad-records handler failed to initialize.
    BadRecordsInitFailure,
    /// A stage failed to initialize.
    StageInitFailure,
}

impl IssueCode {
    /// Stable code string for this diagnostic.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnconnectedInputLane => "GRAPH_0001",
            Self::DanglingOutputLane => "GRAPH_0002",
            Self::DuplicateOutputLane => "GRAPH_0003",
            Self::EmptyPipeline => "VALIDATION_0001",
            Self::DuplicateInstanceName => "VALIDATION_0002",
            Self::MissingSourceStage => "VALIDATION_0003",
            Self::MisplacedSourceStage => "VALIDATION_0004",
            Self::MissingTargetStage => "VALIDATION_0005",
            Self::InvalidStageShape => "VALIDATION_0006",
            Self::StageResolution => "VALIDATION_0007",
            Self::BadRecordsInitFailure => "LIFECYCLE_0700",
            Self::StageInitFailure => "LIFECYCLE_0701",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// One validation diagnostic. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Stage instance the issue is tagged with; `None` for
    /// pipeline-level problems.
    pub instance_name: Option<String>,
    /// Diagnostic code.
    pub code: IssueCode,
    /// Human-readable description.
    pub message: String,
}

impl Issue {
    /// Create an issue tagged with a stage instance.
    #[must_use]
    pub fn stage(instance: impl Into<String>, code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            instance_name: Some(instance.into()),
            code,
            message: message.into(),
        }
    }

    /// Create a pipeline-level issue.
    #[must_use]
    pub fn pipeline(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            instance_name: None,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance_name {
            Some(instance) => write!(f, "[{}] stage '{}': {}", self.code, instance, self.message),
            None => write!(f, "[{}] pipeline: {}", self.code, self.message),
        }
    }
}
