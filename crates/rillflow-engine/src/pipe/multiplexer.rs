//! Multiplexer pipe: one producer, many consumers.

use crate::batch::PipeBatch;

/// Duplicates each input lane's batch onto one output lane per
/// downstream consumer. Consumers must treat the records as read-only;
/// the pipe guarantees independent lane delivery, not independent
/// mutable copies.
pub struct MultiplexerPipe {
    instance_name: String,
    routes: Vec<(String, Vec<String>)>,
    input_lanes: Vec<String>,
    output_lanes: Vec<String>,
}

impl MultiplexerPipe {
    pub(crate) fn new(instance_name: impl Into<String>, routes: Vec<(String, Vec<String>)>) -> Self {
        let input_lanes = routes.iter().map(|(input, _)| input.clone()).collect();
        let output_lanes = routes
            .iter()
            .flat_map(|(_, outputs)| outputs.iter().cloned())
            .collect();
        Self {
            instance_name: instance_name.into(),
            routes,
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
        for (input, outputs) in &self.routes {
            let records = batch.take_lane(input);
            // Move into the last lane, clone for the rest.
            if let Some((last, head)) = outputs.split_last() {
                for lane in head {
                    batch.put_lane(lane.clone(), records.clone());
                }
                batch.put_lane(last.clone(), records);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rillflow_types::Record;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new("src_1", i.to_string(), serde_json::json!(i)))
            .collect()
    }

    #[test]
    fn two_consumers_receive_identical_batches() {
        let mut pipe = MultiplexerPipe::new(
            "src_1",
            vec![(
                "out::src_1::o".to_string(),
                vec![
                    "out::src_1::m::tgt_a".to_string(),
                    "out::src_1::m::tgt_b".to_string(),
                ],
            )],
        );
        let mut batch = PipeBatch::new(10);
        batch.put_lane("out::src_1::o", records(4));
        pipe.process(&mut batch);
        let a = batch.take_lane("out::src_1::m::tgt_a");
        let b = batch.take_lane("out::src_1::m::tgt_b");
        assert_eq!(a.len(), 4);
        assert_eq!(a, b);
    }

    #[test]
    fn single_consumer_moves_without_duplication() {
        let mut pipe = MultiplexerPipe::new(
            "src_1",
            vec![(
                "out::src_1::o".to_string(),
                vec!["out::src_1::m::tgt_a".to_string()],
            )],
        );
        let mut batch = PipeBatch::new(10);
        batch.put_lane("out::src_1::o", records(2));
        pipe.process(&mut batch);
        assert_eq!(batch.take_lane("out::src_1::m::tgt_a").len(), 2);
        assert!(batch.take_lane("out::src_1::o").is_empty());
    }
}
