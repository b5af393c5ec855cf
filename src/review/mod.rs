//! Review outcome model and the blocking-finding resolution loop.

mod findings;
mod resolution;

pub use findings::{FindingSeverity, ReviewFinding, ReviewOutcome};
pub use resolution::ReviewResolver;
