//! Records, record headers, and error-routed records.
//!
//! Payloads are opaque JSON; the engine moves records between lanes
//! without ever interpreting their content.

use crate::error::StageError;
use serde::{Deserialize, Serialize};

/// Provenance and error annotations for one record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordHeader {
    /// Identifier assigned by the producing stage (offset, key, ...).
    pub source_id: String,
    /// Instance name of the stage that created the record.
    pub stage_creator: String,
    /// Stable id tracking the record across the pipeline.
    pub tracking_id: String,
    /// Instance name of the stage that rejected the record, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_stage: Option<String>,
    /// Stable code of the rejecting error, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Human-readable rejection message, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// One unit of data flowing through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Provenance and error annotations.
    pub header: RecordHeader,
    /// Opaque payload.
    pub value: serde_json::Value,
}

impl Record {
    /// Create a record with a fresh header.
    #[must_use]
    pub fn new(
        stage_creator: impl Into<String>,
        source_id: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        let stage_creator = stage_creator.into();
        let source_id = source_id.into();
        let tracking_id = format!("{stage_creator}::{source_id}");
        Self {
            header: RecordHeader {
                source_id,
                stage_creator,
                tracking_id,
                error_stage: None,
                error_code: None,
                error_message: None,
            },
            value,
        }
    }
}

/// A record plus the error that rejected it.
///
/// This is the unit routed to the bad-records handler. The contained
/// record's header is stamped with the rejecting stage and error so the
/// annotation survives even if the error stage only persists records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// The rejected record, header annotated with the failure.
    pub record: Record,
    /// The error that caused the rejection.
    pub error: StageError,
}

impl ErrorRecord {
    /// Annotate `record` with the rejection and wrap it.
    #[must_use]
    pub fn new(mut record: Record, error_stage: impl Into<String>, error: StageError) -> Self {
        record.header.error_stage = Some(error_stage.into());
        record.header.error_code = Some(error.code.clone());
        record.header.error_message = Some(error.message.clone());
        Self { record, error }
    }
}
