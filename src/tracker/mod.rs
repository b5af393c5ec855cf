//! Issue tracker collaboration.
//!
//! The tracker is an external collaborator: the engine only needs to fetch
//! the issue a run addresses and mark it in progress. The trait seam keeps
//! the orchestrator testable without the `gh` CLI installed.

mod issues;

pub use issues::{GhIssueTracker, Issue, IssueTracker};
