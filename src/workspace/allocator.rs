//! Git-worktree-backed workspace allocation.
//!
//! One worktree per run under the trees directory, checked out on a branch
//! created for that run. Runs never observe each other's uncommitted
//! changes, and the primary working copy is never touched. Validation is
//! deliberately strict: a missing or structurally broken worktree is
//! surfaced with a reason, never silently recreated, because recreating it
//! would sever branch and history continuity.

use git2::{BranchType, Repository, WorktreeAddOptions};
use std::path::PathBuf;
use tracing::info;

use crate::config::Config;
use crate::errors::WorkspaceError;
use crate::state::{PortPair, RunState};
use crate::workspace::{PortLedger, WorkspaceProvider};

pub struct GitWorkspaceAllocator {
    repo_root: PathBuf,
    trees_dir: PathBuf,
    ledger: PortLedger,
}

impl GitWorkspaceAllocator {
    pub fn from_config(config: &Config) -> Self {
        Self {
            repo_root: config.repo_root.clone(),
            trees_dir: config.trees_dir.clone(),
            ledger: PortLedger::new(
                config.state_dir.clone(),
                config.runs_dir.clone(),
                config.port_base,
                config.port_span,
            ),
        }
    }

    fn validation_err(run_id: &str, reason: impl Into<String>) -> WorkspaceError {
        WorkspaceError::Validation {
            run_id: run_id.to_string(),
            reason: reason.into(),
        }
    }
}

impl WorkspaceProvider for GitWorkspaceAllocator {
    fn create_workspace(
        &self,
        run_id: &str,
        branch_name: &str,
    ) -> Result<PathBuf, WorkspaceError> {
        let repo = Repository::open(&self.repo_root)?;
        let path = self.trees_dir.join(run_id);

        if path.exists() {
            // Plan re-runs land here: accept the workspace if it is the
            // registered worktree for this run, otherwise refuse loudly.
            if repo.find_worktree(run_id).is_ok() {
                info!(run_id, path = %path.display(), "reusing existing worktree");
                return Ok(path);
            }
            return Err(Self::validation_err(
                run_id,
                format!(
                    "directory {} exists but is not a registered worktree",
                    path.display()
                ),
            ));
        }

        std::fs::create_dir_all(&self.trees_dir).map_err(|source| WorkspaceError::Io {
            path: self.trees_dir.clone(),
            source,
        })?;

        let head = repo.head()?.peel_to_commit()?;
        let branch = match repo.find_branch(branch_name, BranchType::Local) {
            Ok(existing) => existing,
            Err(_) => repo.branch(branch_name, &head, false)?,
        };
        let reference = branch.into_reference();

        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(&reference));
        repo.worktree(run_id, &path, Some(&opts))?;

        info!(run_id, branch = branch_name, path = %path.display(), "created worktree");
        Ok(path)
    }

    fn allocate_ports(&self, state: &mut RunState) -> Result<PortPair, WorkspaceError> {
        self.ledger.allocate(state)
    }

    fn validate(&self, run_id: &str, state: &RunState) -> Result<(), WorkspaceError> {
        let path = state
            .workspace_path
            .as_ref()
            .ok_or_else(|| Self::validation_err(run_id, "no workspace recorded in state"))?;
        let branch_name = state
            .branch_name
            .as_ref()
            .ok_or_else(|| Self::validation_err(run_id, "no branch recorded in state"))?;

        if !path.exists() {
            return Err(Self::validation_err(
                run_id,
                format!("workspace directory missing: {}", path.display()),
            ));
        }

        let repo = Repository::open(&self.repo_root)?;
        let worktree = repo.find_worktree(run_id).map_err(|err| {
            Self::validation_err(run_id, format!("worktree not registered: {err}"))
        })?;
        worktree.validate().map_err(|err| {
            Self::validation_err(run_id, format!("worktree structurally invalid: {err}"))
        })?;

        let tree_repo = Repository::open(path).map_err(|err| {
            Self::validation_err(run_id, format!("cannot open worktree repository: {err}"))
        })?;
        let head = tree_repo.head().map_err(|err| {
            Self::validation_err(run_id, format!("cannot read worktree HEAD: {err}"))
        })?;
        let checked_out = head.shorthand().unwrap_or("<detached>");
        if checked_out != branch_name {
            return Err(Self::validation_err(
                run_id,
                format!("expected branch {branch_name}, worktree is on {checked_out}"),
            ));
        }

        Ok(())
    }
}
