//! Observer pipe: pass-through with an optional sampling side effect.

use crate::api::ObserverSlot;
use crate::batch::PipeBatch;

/// Copies records from input lanes to output lanes unchanged, handing
/// the registered observer a reference first. With no observer it is a
/// pure rename.
pub struct ObserverPipe {
    instance_name: String,
    input_lanes: Vec<String>,
    output_lanes: Vec<String>,
    observer: ObserverSlot,
}

impl ObserverPipe {
    pub(crate) fn new(
        instance_name: impl Into<String>,
        input_lanes: Vec<String>,
        output_lanes: Vec<String>,
        observer: ObserverSlot,
    ) -> Self {
        debug_assert_eq!(input_lanes.len(), output_lanes.len());
        Self {
            instance_name: instance_name.into(),
            input_lanes,
            output_lanes,
            observer,
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
        for (input, output) in self.input_lanes.iter().zip(&self.output_lanes) {
            let records = batch.take_lane(input);
            if let ObserverSlot::Registered(observer) = &self.observer {
                observer.observe(&self.instance_name, &records);
            }
            batch.put_lane(output.clone(), records);
        }
    }
}
