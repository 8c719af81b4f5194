//! Pipeline definition loading and shape validation.
//!
//! Parsing turns a YAML definition (with `${VAR}` environment
//! substitution) into a [`rillflow_types::PipelineConfig`]; shape
//! validation checks the configured stages against their resolved
//! definitions before any stage code runs.

mod parser;
mod validator;

pub use parser::{parse_pipeline, parse_pipeline_str, substitute_env_vars};
pub use validator::validate_shape;
