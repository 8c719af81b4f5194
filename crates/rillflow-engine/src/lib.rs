//! Pipe-graph synthesis and execution engine.
//!
//! The engine assembles a declarative pipeline definition (ordered stage
//! configurations with declared named input/output lanes) into a flat
//! array of connected pipes, then drives record batches through that
//! array with per-stage error isolation and lifecycle management.
//!
//! Collaborators the engine consumes but does not implement — stage
//! loading, the batch-driving runner, observers, metrics — live behind
//! the traits in [`api`].

pub mod api;
pub mod bad_records;
pub mod batch;
pub mod config;
pub mod context;
pub mod error;
pub mod lanes;
pub mod pipe;
pub mod pipeline;
pub mod runtime;
pub mod sampler;

pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineBuilder};
