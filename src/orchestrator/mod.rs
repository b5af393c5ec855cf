//! Phase sequencing: the state machine and the pipeline that drives it.

mod phase;
mod pipeline;

pub use phase::Phase;
pub use pipeline::{Pipeline, PipelineOptions};
