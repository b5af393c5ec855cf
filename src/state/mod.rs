//! Persisted run state: the central record every phase reads and extends.

mod store;

pub use store::StateStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::review::ReviewOutcome;

/// Disjoint pair of network ports reserved for one run's duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPair {
    pub primary: u16,
    pub secondary: u16,
}

/// Overall run status. `Failed` is absorbing: no phase proceeds once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Active,
    Failed,
    Completed,
}

/// The persisted record for one run, keyed by `run_id`.
///
/// `phase_history` is append-only: labels of successfully completed phases
/// in execution order, never reordered or truncated. `workspace_path`,
/// `branch_name`, and `ports` are set once by the plan phase and immutable
/// afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub issue_ref: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_class: Option<String>,
    #[serde(default)]
    pub phase_history: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<PortPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs_ref: Option<String>,
    /// Soft test outcome, recorded by the test phase and deferred to review.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests_passed: Option<bool>,
    /// Last structured review result, replaced each time review runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_outcome: Option<ReviewOutcome>,
    /// Review evidence artifact directory, recorded by the review phase so
    /// consumers never probe the filesystem for it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_dir: Option<PathBuf>,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(run_id: &str, issue_ref: &str) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.to_string(),
            issue_ref: issue_ref.to_string(),
            issue_class: None,
            phase_history: Vec::new(),
            workspace_path: None,
            branch_name: None,
            ports: None,
            spec_ref: None,
            plan_ref: None,
            docs_ref: None,
            tests_passed: None,
            review_outcome: None,
            evidence_dir: None,
            status: RunStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the named phase has already recorded success.
    pub fn has_completed(&self, phase_label: &str) -> bool {
        self.phase_history.iter().any(|p| p == phase_label)
    }

    /// Label of the most recently completed phase, if any.
    pub fn last_completed(&self) -> Option<&str> {
        self.phase_history.last().map(String::as_str)
    }
}

/// Mint a new run identifier: the first 8 hex chars of a UUID v4, stable for
/// the run's lifetime.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
