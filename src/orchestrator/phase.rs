//! The fixed phase sequence.
//!
//! A run moves `plan → build → test → review → document`; each phase's
//! completion is recorded in run state as its label, and a phase may only
//! start once its predecessor's label is recorded. Failure is not a phase:
//! it is the run's status, reachable from anywhere.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::state::RunState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Plan,
    Build,
    Test,
    Review,
    Document,
}

impl Phase {
    /// Execution order.
    pub const ALL: [Phase; 5] = [
        Phase::Plan,
        Phase::Build,
        Phase::Test,
        Phase::Review,
        Phase::Document,
    ];

    /// Label recorded in `phase_history`.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Plan => "plan",
            Phase::Build => "build",
            Phase::Test => "test",
            Phase::Review => "review",
            Phase::Document => "document",
        }
    }

    pub fn from_label(label: &str) -> Option<Phase> {
        Phase::ALL.iter().copied().find(|p| p.label() == label)
    }

    /// The phase that must have completed before this one may start.
    pub fn prior(&self) -> Option<Phase> {
        match self {
            Phase::Plan => None,
            Phase::Build => Some(Phase::Plan),
            Phase::Test => Some(Phase::Build),
            Phase::Review => Some(Phase::Test),
            Phase::Document => Some(Phase::Review),
        }
    }

    /// First phase the run has not yet completed, or `None` when every
    /// phase's label is recorded.
    pub fn first_unmet(state: &RunState) -> Option<Phase> {
        Phase::ALL
            .into_iter()
            .find(|p| !state.has_completed(p.label()))
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_roundtrip() {
        for phase in Phase::ALL {
            assert_eq!(Phase::from_label(phase.label()), Some(phase));
        }
        assert_eq!(Phase::from_label("deploy"), None);
    }

    #[test]
    fn test_order_and_priors() {
        assert_eq!(Phase::Plan.prior(), None);
        assert_eq!(Phase::Build.prior(), Some(Phase::Plan));
        assert_eq!(Phase::Test.prior(), Some(Phase::Build));
        assert_eq!(Phase::Review.prior(), Some(Phase::Test));
        assert_eq!(Phase::Document.prior(), Some(Phase::Review));
        assert!(Phase::Plan < Phase::Document);
    }

    #[test]
    fn test_first_unmet_walks_the_history() {
        let mut state = RunState::new("ab12cd34", "123");
        assert_eq!(Phase::first_unmet(&state), Some(Phase::Plan));

        state.phase_history.push("plan".into());
        state.phase_history.push("build".into());
        assert_eq!(Phase::first_unmet(&state), Some(Phase::Test));

        for label in ["test", "review", "document"] {
            state.phase_history.push(label.into());
        }
        assert_eq!(Phase::first_unmet(&state), None);
    }

    #[test]
    fn test_serde_wire_names() {
        assert_eq!(serde_json::to_string(&Phase::Review).unwrap(), "\"review\"");
        let parsed: Phase = serde_json::from_str("\"document\"").unwrap();
        assert_eq!(parsed, Phase::Document);
    }
}
