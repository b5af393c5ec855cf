//! Per-run isolation: git worktrees and port reservation.
//!
//! Each run gets a detached worktree bound to a dedicated branch under the
//! trees directory, plus an adjacent pair of ports no other live run holds.
//! The trait seam exists so the orchestrator can be exercised without a real
//! git repository.

mod allocator;
mod ports;

pub use allocator::GitWorkspaceAllocator;
pub use ports::PortLedger;

use std::path::PathBuf;

use crate::errors::WorkspaceError;
use crate::state::{PortPair, RunState};

pub trait WorkspaceProvider: Send + Sync {
    /// Produce (or re-find) the isolated workspace for this run, bound
    /// exclusively to `branch_name`.
    fn create_workspace(&self, run_id: &str, branch_name: &str)
    -> Result<PathBuf, WorkspaceError>;

    /// Reserve the lowest unused adjacent port pair across all live runs,
    /// recording it durably in the run's state before returning so a
    /// concurrently starting run can never scan past it.
    fn allocate_ports(&self, state: &mut RunState) -> Result<PortPair, WorkspaceError>;

    /// Confirm the recorded workspace still exists and is structurally
    /// intact before any phase that depends on it proceeds.
    fn validate(&self, run_id: &str, state: &RunState) -> Result<(), WorkspaceError>;
}
