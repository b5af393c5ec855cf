//! Runtime configuration for runway.
//!
//! `Config` bridges the `runway.toml` project file with the runtime needs of
//! the orchestrator: directory layout for run state and worktrees, the agent
//! command, retry policy, and the port range used for per-run allocation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of an optional `runway.toml` at the repository root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunwayToml {
    #[serde(default)]
    pub agent: AgentSettings,
    #[serde(default)]
    pub ports: PortSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Command used to invoke the external agent.
    #[serde(default = "default_agent_cmd")]
    pub cmd: String,
    /// Per-call timeout in seconds. Agent calls can legitimately run for
    /// minutes, so the default is generous.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Attempt ceiling for transient failures.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Initial backoff between attempts, doubled per retry.
    #[serde(default = "default_backoff_secs")]
    pub retry_backoff_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortSettings {
    /// First port considered for allocation.
    #[serde(default = "default_port_base")]
    pub base: u16,
    /// Number of ports in the allocatable range.
    #[serde(default = "default_port_span")]
    pub span: u16,
}

fn default_agent_cmd() -> String {
    "claude".to_string()
}
fn default_timeout_secs() -> u64 {
    1800
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_backoff_secs() -> u64 {
    5
}
fn default_port_base() -> u16 {
    9100
}
fn default_port_span() -> u16 {
    200
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            cmd: default_agent_cmd(),
            timeout_secs: default_timeout_secs(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_secs: default_backoff_secs(),
        }
    }
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            base: default_port_base(),
            span: default_port_span(),
        }
    }
}

impl RunwayToml {
    /// Load `runway.toml` from the repository root, falling back to defaults
    /// when the file does not exist.
    pub fn load_or_default(repo_root: &Path) -> Result<Self> {
        let path = repo_root.join("runway.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Primary working copy this engine orchestrates runs against.
    pub repo_root: PathBuf,
    /// Root for everything runway persists (`<repo>/.runway`).
    pub state_dir: PathBuf,
    /// Per-run state and artifact records (`<state_dir>/runs`).
    pub runs_dir: PathBuf,
    /// Per-run isolated worktrees (`<state_dir>/trees`).
    pub trees_dir: PathBuf,
    pub agent_cmd: String,
    pub agent_timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_backoff_secs: u64,
    pub port_base: u16,
    pub port_span: u16,
    pub verbose: bool,
}

impl Config {
    pub fn new(repo_root: PathBuf, verbose: bool) -> Result<Self> {
        let repo_root = repo_root
            .canonicalize()
            .context("Failed to resolve repository root")?;

        let settings = RunwayToml::load_or_default(&repo_root)?;

        // Env overrides are handy in CI and for pointing at a stub agent in
        // development.
        let agent_cmd =
            std::env::var("RUNWAY_AGENT_CMD").unwrap_or_else(|_| settings.agent.cmd.clone());

        let state_dir = repo_root.join(".runway");
        let runs_dir = state_dir.join("runs");
        let trees_dir = state_dir.join("trees");

        Ok(Self {
            repo_root,
            state_dir,
            runs_dir,
            trees_dir,
            agent_cmd,
            agent_timeout_secs: settings.agent.timeout_secs,
            retry_attempts: settings.agent.retry_attempts,
            retry_backoff_secs: settings.agent.retry_backoff_secs,
            port_base: settings.ports.base,
            port_span: settings.ports.span,
            verbose,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.runs_dir).context("Failed to create runs directory")?;
        std::fs::create_dir_all(&self.trees_dir).context("Failed to create trees directory")?;
        Ok(())
    }

    /// Artifact directory for one phase of one run. Prompts, raw agent
    /// output, and review evidence land here.
    pub fn artifact_dir(&self, run_id: &str, phase_label: &str) -> PathBuf {
        self.runs_dir.join(run_id).join(phase_label)
    }
}
