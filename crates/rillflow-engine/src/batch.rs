//! Per-cycle batch containers.
//!
//! A [`PipeBatch`] is the set of records flowing on all lanes during one
//! execution cycle: created by the runner, mutated by each pipe in array
//! order, discarded after consumption. A [`BatchMaker`] collects one
//! stage execution's output, keyed by declared output lane.

use std::collections::HashMap;

use rillflow_types::{ErrorRecord, Record, StageError};

/// Records flowing on all lanes during one execution cycle.
#[derive(Debug, Default)]
pub struct PipeBatch {
    batch_size: usize,
    lanes: HashMap<String, Vec<Record>>,
    error_records: Vec<ErrorRecord>,
}

impl PipeBatch {
    /// Create an empty batch with a size hint for sources.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            lanes: HashMap::new(),
            error_records: Vec::new(),
        }
    }

    /// Size hint sources should honor this cycle.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Deliver records onto a lane.
    ///
    /// Lane names are unique within one built pipeline, so a second
    /// delivery to the same lane within a cycle is a pipe bug.
    pub fn put_lane(&mut self, lane: impl Into<String>, records: Vec<Record>) {
        let lane = lane.into();
        debug_assert!(
            !self.lanes.contains_key(&lane),
            "lane '{lane}' produced twice in one cycle"
        );
        self.lanes.insert(lane, records);
    }

    /// Consume the records on a lane; an unproduced lane yields an
    /// empty batch.
    #[must_use]
    pub fn take_lane(&mut self, lane: &str) -> Vec<Record> {
        self.lanes.remove(lane).unwrap_or_default()
    }

    /// Peek at a lane without consuming it.
    #[must_use]
    pub fn lane(&self, lane: &str) -> Option<&[Record]> {
        self.lanes.get(lane).map(Vec::as_slice)
    }

    /// Names of lanes currently carrying records.
    pub fn lane_names(&self) -> impl Iterator<Item = &str> {
        self.lanes.keys().map(String::as_str)
    }

    /// Append records rejected under a to-error policy this cycle.
    pub fn push_error_records(&mut self, records: impl IntoIterator<Item = ErrorRecord>) {
        self.error_records.extend(records);
    }

    /// Drain the rejected records accumulated this cycle.
    #[must_use]
    pub fn take_error_records(&mut self) -> Vec<ErrorRecord> {
        std::mem::take(&mut self.error_records)
    }

    /// Number of rejected records currently held.
    #[must_use]
    pub fn error_record_count(&self) -> usize {
        self.error_records.len()
    }
}

/// Input handed to one stage execution.
#[derive(Debug)]
pub struct StageBatch {
    /// Records from the stage's resolved input lane; empty for sources.
    pub records: Vec<Record>,
    /// Size hint for sources.
    pub size_hint: usize,
}

/// Collects the records one stage execution emits, keyed by the stage's
/// declared output lanes.
#[derive(Debug)]
pub struct BatchMaker {
    declared_lanes: Vec<String>,
    outputs: HashMap<String, Vec<Record>>,
    rejected: Vec<(Record, StageError)>,
}

impl BatchMaker {
    /// Create a maker for a stage with the given declared output lanes.
    #[must_use]
    pub fn new(declared_lanes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            declared_lanes: declared_lanes.into_iter().map(Into::into).collect(),
            outputs: HashMap::new(),
            rejected: Vec::new(),
        }
    }

    /// Declared output lanes, in declaration order.
    #[must_use]
    pub fn declared_lanes(&self) -> &[String] {
        &self.declared_lanes
    }

    /// Emit a record to the first declared lane.
    ///
    /// # Errors
    ///
    /// Fails when the stage declares no output lanes (a target trying
    /// to emit).
    pub fn add(&mut self, record: Record) -> Result<(), StageError> {
        match self.declared_lanes.first() {
            Some(lane) => {
                let lane = lane.clone();
                self.outputs.entry(lane).or_default().push(record);
                Ok(())
            }
            None => Err(StageError::internal(
                "NO_OUTPUT_LANE",
                "stage declares no output lanes",
            )),
        }
    }

    /// Emit a record to a specific declared lane.
    ///
    /// # Errors
    ///
    /// Fails when `lane` is not one of the stage's declared lanes.
    pub fn add_to_lane(&mut self, lane: &str, record: Record) -> Result<(), StageError> {
        if !self.declared_lanes.iter().any(|l| l == lane) {
            return Err(StageError::internal(
                "UNKNOWN_LANE",
                format!("lane '{lane}' is not declared by this stage"),
            ));
        }
        self.outputs.entry(lane.to_string()).or_default().push(record);
        Ok(())
    }

    /// Reject a record; the owning pipe applies the stage's per-record
    /// error policy.
    pub fn to_error(&mut self, record: Record, error: StageError) {
        self.rejected.push((record, error));
    }

    pub(crate) fn into_parts(self) -> (HashMap<String, Vec<Record>>, Vec<(Record, StageError)>) {
        (self.outputs, self.rejected)
    }
}

/// Captured outputs of one stage for a cycle, used to replay previews.
#[derive(Debug, Clone)]
pub struct StageOutput {
    /// Instance whose execution this replaces.
    pub instance_name: String,
    /// Declared lane name to records.
    pub lanes: HashMap<String, Vec<Record>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: u64) -> Record {
        Record::new("test", id.to_string(), serde_json::json!(id))
    }

    #[test]
    fn take_lane_consumes() {
        let mut batch = PipeBatch::new(10);
        batch.put_lane("a", vec![record(1), record(2)]);
        assert_eq!(batch.take_lane("a").len(), 2);
        assert!(batch.take_lane("a").is_empty());
    }

    #[test]
    fn unproduced_lane_is_empty() {
        let mut batch = PipeBatch::new(10);
        assert!(batch.take_lane("missing").is_empty());
    }

    #[test]
    fn error_records_accumulate_and_drain() {
        let mut batch = PipeBatch::new(10);
        let err = StageError::record("BAD", "nope");
        batch.push_error_records(vec![ErrorRecord::new(record(1), "p_1", err)]);
        assert_eq!(batch.error_record_count(), 1);
        assert_eq!(batch.take_error_records().len(), 1);
        assert_eq!(batch.error_record_count(), 0);
    }

    #[test]
    fn batch_maker_default_lane_is_first_declared() {
        let mut maker = BatchMaker::new(["main", "side"]);
        maker.add(record(1)).unwrap();
        maker.add_to_lane("side", record(2)).unwrap();
        let (outputs, rejected) = maker.into_parts();
        assert_eq!(outputs["main"].len(), 1);
        assert_eq!(outputs["side"].len(), 1);
        assert!(rejected.is_empty());
    }

    #[test]
    fn batch_maker_rejects_unknown_lane() {
        let mut maker = BatchMaker::new(["main"]);
        let err = maker.add_to_lane("nope", record(1)).unwrap_err();
        assert_eq!(err.code, "UNKNOWN_LANE");
    }

    #[test]
    fn batch_maker_without_lanes_rejects_emission() {
        let mut maker = BatchMaker::new(Vec::<String>::new());
        let err = maker.add(record(1)).unwrap_err();
        assert_eq!(err.code, "NO_OUTPUT_LANE");
    }
}
