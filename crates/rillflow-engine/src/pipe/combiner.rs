//! Combiner pipe: many producers, one consumer.

use crate::batch::PipeBatch;

/// Concatenates the batches arriving on its input lanes into the single
/// lane the downstream stage pipe reads. Per-lane arrival order is
/// preserved; across lanes the order is configured lane order, nothing
/// finer.
pub struct CombinerPipe {
    instance_name: String,
    input_lanes: Vec<String>,
    output_lanes: Vec<String>,
}

impl CombinerPipe {
    pub(crate) fn new(
        instance_name: impl Into<String>,
        input_lanes: Vec<String>,
        output_lanes: Vec<String>,
    ) -> Self {
        debug_assert_eq!(output_lanes.len(), 1);
        Self {
            instance_name: instance_name.into(),
            input_lanes,
            output_lanes,
        }
    }

    pub(crate) fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub(crate) fn input_lanes(&self) -> &[String] {
        &self.input_lanes
    }

    pub(crate) fn output_lanes(&self) -> &[String] {
        &self.output_lanes
    }

    pub(crate) fn process(&mut self, batch: &mut PipeBatch) {
        let mut merged = Vec::new();
        for lane in &self.input_lanes {
            merged.append(&mut batch.take_lane(lane));
        }
        batch.put_lane(self.output_lanes[0].clone(), merged);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rillflow_types::Record;

    fn records(prefix: &str, n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new(prefix, i.to_string(), serde_json::json!(i)))
            .collect()
    }

    #[test]
    fn merges_two_lanes_preserving_per_lane_order() {
        let mut pipe = CombinerPipe::new(
            "tgt_1",
            vec!["a::src_1::m::tgt_1".into(), "b::src_1::m::tgt_1".into()],
            vec!["tgt_1::c".into()],
        );
        let mut batch = PipeBatch::new(10);
        batch.put_lane("a::src_1::m::tgt_1", records("a", 2));
        batch.put_lane("b::src_1::m::tgt_1", records("b", 3));
        pipe.process(&mut batch);
        let merged = batch.take_lane("tgt_1::c");
        assert_eq!(merged.len(), 5);
        // Configured lane order: all of lane a, then all of lane b.
        assert_eq!(merged[0].header.stage_creator, "a");
        assert_eq!(merged[1].header.stage_creator, "a");
        assert_eq!(merged[2].header.stage_creator, "b");
    }

    #[test]
    fn missing_lane_contributes_nothing() {
        let mut pipe = CombinerPipe::new(
            "tgt_1",
            vec!["a::src_1::m::tgt_1".into(), "b::src_1::m::tgt_1".into()],
            vec!["tgt_1::c".into()],
        );
        let mut batch = PipeBatch::new(10);
        batch.put_lane("a::src_1::m::tgt_1", records("a", 2));
        pipe.process(&mut batch);
        assert_eq!(batch.take_lane("tgt_1::c").len(), 2);
    }
}
