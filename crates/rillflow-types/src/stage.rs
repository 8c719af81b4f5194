//! Stage kind metadata: type, static definition, and per-instance info.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a stage sits in the data flow.
///
/// The type fully determines the sequence of pipes synthesized for a
/// stage at build time; no runtime type inspection happens afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    /// Produces records from an external system.
    Source,
    /// Transforms records in flight.
    Processor,
    /// Delivers records to an external system.
    Target,
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Source => "source",
            Self::Processor => "processor",
            Self::Target => "target",
        };
        f.write_str(s)
    }
}

/// Static metadata for a stage kind, resolved through the stage library.
///
/// Immutable once loaded. The engine never constructs these itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDefinition {
    /// Library-unique stage name (the lookup key in stage configs).
    pub name: String,
    /// Stage implementation version.
    pub version: String,
    /// Kind of stage this definition describes.
    pub stage_type: StageType,
}

impl StageDefinition {
    /// Create a new definition.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        stage_type: StageType,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            stage_type,
        }
    }
}

/// Per-instance stage info exposed to execution contexts.
///
/// Every stage context carries the full roster of these so a stage can
/// see what else runs in its pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageInfo {
    /// Definition name of the stage.
    pub name: String,
    /// Definition version.
    pub version: String,
    /// Configured instance name, unique within the pipeline.
    pub instance_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_type_serde_snake_case() {
        let json = serde_json::to_string(&StageType::Processor).unwrap();
        assert_eq!(json, "\"processor\"");
        let back: StageType = serde_json::from_str("\"target\"").unwrap();
        assert_eq!(back, StageType::Target);
    }

    #[test]
    fn stage_type_display() {
        assert_eq!(StageType::Source.to_string(), "source");
        assert_eq!(StageType::Target.to_string(), "target");
    }

    #[test]
    fn definition_roundtrip() {
        let def = StageDefinition::new("dev-source", "1.0.0", StageType::Source);
        let json = serde_json::to_string(&def).unwrap();
        let back: StageDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(def, back);
    }
}
