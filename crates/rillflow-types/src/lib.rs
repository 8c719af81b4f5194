//! Shared rillflow data model types.
//!
//! This crate is dependency-light by design: everything here is plain
//! serde-serializable data shared between the execution engine, stage
//! implementations, and external tooling that inspects pipelines.

pub mod config;
pub mod error;
pub mod issue;
pub mod record;
pub mod stage;

pub use config::{ExecutionMode, OnRecordError, PipelineConfig, StageConfig};
pub use error::{ErrorCategory, StageError};
pub use issue::{Issue, IssueCode};
pub use record::{ErrorRecord, Record, RecordHeader};
pub use stage::{StageDefinition, StageInfo, StageType};
