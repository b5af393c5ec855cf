//! `gh`-backed issue fetching.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// The slice of an issue this engine cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn fetch(&self, issue_ref: &str) -> Result<Issue>;

    /// Best-effort status update on the tracker side. Callers treat failure
    /// as a warning, not a fault.
    async fn update_status(&self, issue_ref: &str, status: &str) -> Result<()>;
}

/// Issue tracker backed by the GitHub CLI.
pub struct GhIssueTracker {
    repo_root: PathBuf,
}

impl GhIssueTracker {
    pub fn new(repo_root: PathBuf) -> Self {
        Self { repo_root }
    }
}

#[async_trait]
impl IssueTracker for GhIssueTracker {
    async fn fetch(&self, issue_ref: &str) -> Result<Issue> {
        debug!(issue = issue_ref, "fetching issue via gh");
        let output = Command::new("gh")
            .args(["issue", "view", issue_ref, "--json", "number,title,body"])
            .current_dir(&self.repo_root)
            .output()
            .await
            .context("Failed to run gh; is the GitHub CLI installed?")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("gh issue view {issue_ref} failed: {}", stderr.trim());
        }

        parse_issue(&String::from_utf8_lossy(&output.stdout))
    }

    async fn update_status(&self, issue_ref: &str, status: &str) -> Result<()> {
        let output = Command::new("gh")
            .args(["issue", "edit", issue_ref, "--add-label", status])
            .current_dir(&self.repo_root)
            .output()
            .await
            .context("Failed to run gh")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("gh issue edit {issue_ref} failed: {}", stderr.trim());
        }
        Ok(())
    }
}

fn parse_issue(json: &str) -> Result<Issue> {
    serde_json::from_str(json).context("Failed to parse gh issue output")
}
