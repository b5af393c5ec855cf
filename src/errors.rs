//! Typed error hierarchy for the runway orchestrator.
//!
//! One enum per subsystem:
//! - `StateError` — run-state persistence failures
//! - `WorkspaceError` — worktree and port allocation failures
//! - `GatewayError` — agent invocation failures
//! - `PayloadError` — structured-output extraction failures
//! - `ResolutionError` — review resolution failures

use thiserror::Error;

/// Errors from the run-state store.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("No run state found for run id {run_id}")]
    Missing { run_id: String },

    #[error("Corrupt run state at {path}: {source}")]
    Corrupt {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read run state at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write run state at {path}: {source}")]
    WriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from workspace creation, validation, and port allocation.
///
/// Validation failures and resource exhaustion are distinct variants so
/// callers can report them separately.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Workspace validation failed for run {run_id}: {reason}")]
    Validation { run_id: String, reason: String },

    #[error("No free port pair in range {base}..{end} across live runs")]
    PortsExhausted { base: u16, end: u16 },

    #[error("Failed to lock port ledger at {path}: {source}")]
    LedgerLock {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Failed to record port reservation: {0}")]
    Reservation(#[from] StateError),

    #[error("Failed to prepare workspace directory {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the agent gateway.
///
/// Transient variants are retried with backoff up to the attempt ceiling;
/// `Exhausted` is what surfaces once the budget is spent. A deterministic
/// agent failure is never an error here — it comes back as a response with
/// `success = false`.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Failed to spawn agent process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("Agent call timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Agent returned empty output")]
    EmptyOutput,

    #[error("Agent call failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },

    #[error("Failed to write agent log at {path}: {source}")]
    LogWriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GatewayError {
    /// Whether this failure class is worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::SpawnFailed(_) | GatewayError::Timeout { .. } | GatewayError::EmptyOutput
        )
    }
}

/// Errors from structured-payload extraction.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("No structured block found in agent output")]
    NoStructuredBlock,

    #[error("Malformed structured block: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Errors from the review resolution loop.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Failed to resolve blocking finding {index}: {description}")]
    PatchFailed { index: u32, description: String },

    #[error("{count} blocking finding(s) present and resolution was skipped")]
    Unresolved { count: usize },

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
