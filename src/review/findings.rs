//! Review outcome types.
//!
//! The review phase's agent emits a structured document with a summary, an
//! overall verdict, and an ordered list of findings. Field names on the wire
//! (`issue_severity`, `issue_description`, ...) follow the review template's
//! contract; the Rust names say what the fields mean to this engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a single review finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    /// Requires corrective action before the run may proceed.
    Blocker,
    /// Should be addressed, but does not block the run.
    Minor,
    /// Informational observation.
    Info,
}

impl FindingSeverity {
    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocker)
    }
}

impl fmt::Display for FindingSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Blocker => write!(f, "blocker"),
            Self::Minor => write!(f, "minor"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// One element of a review outcome.
///
/// Created by the review phase from the agent's structured output, consumed
/// by the resolution loop, and only persisted as part of
/// [`ReviewOutcome`] in run state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewFinding {
    #[serde(rename = "review_issue_number", default)]
    pub index: u32,
    #[serde(rename = "issue_severity")]
    pub severity: FindingSeverity,
    #[serde(rename = "issue_description")]
    pub description: String,
    /// Free-text instruction used to drive a corrective patch.
    #[serde(rename = "issue_resolution")]
    pub resolution_hint: String,
    /// Optional pointer to a supporting artifact, e.g. a captured screenshot.
    #[serde(
        rename = "issue_screenshot_path",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub evidence_ref: Option<String>,
}

/// The review phase's full structured result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub review_summary: String,
    pub success: bool,
    #[serde(default)]
    pub review_issues: Vec<ReviewFinding>,
}

impl ReviewOutcome {
    /// Blocking findings in the order the review produced them.
    pub fn blocking(&self) -> Vec<&ReviewFinding> {
        self.review_issues
            .iter()
            .filter(|f| f.severity.is_blocking())
            .collect()
    }

    pub fn has_blockers(&self) -> bool {
        self.review_issues.iter().any(|f| f.severity.is_blocking())
    }

    /// Drop resolved blockers from the recorded issue list. Called once the
    /// resolution loop has patched them so persisted state reflects what
    /// remains outstanding.
    pub fn clear_blockers(&mut self) {
        self.review_issues.retain(|f| !f.severity.is_blocking());
    }
}
