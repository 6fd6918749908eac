pub mod pipeline;
pub mod validate;

pub use pipeline::{Pipeline, RunReport};
pub use validate::{aggregate_events, assign_events, validate_events, ValidationError};
