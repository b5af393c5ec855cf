//! The single choke point for agent invocation.
//!
//! [`CommandGateway`] spawns the configured agent command, feeds the
//! templated prompt via stdin, and captures stdout. Transient failures
//! (spawn error, timeout, empty output) are retried with doubling backoff up
//! to a fixed attempt ceiling. A deterministic failure — the agent ran and
//! reported failure — is surfaced immediately as a response with
//! `success = false` and never retried.
//!
//! The gateway never interprets the payload; structured-content extraction
//! belongs to the calling phase (see [`crate::agent::payload`]).

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::agent::{AgentRequest, AgentResponse};
use crate::config::Config;
use crate::errors::GatewayError;

#[async_trait]
pub trait AgentGateway: Send + Sync {
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentResponse, GatewayError>;
}

pub struct CommandGateway {
    agent_cmd: String,
    repo_root: PathBuf,
    runs_dir: PathBuf,
    timeout: Duration,
    retry_attempts: u32,
    backoff: Duration,
}

impl CommandGateway {
    pub fn from_config(config: &Config) -> Self {
        Self {
            agent_cmd: config.agent_cmd.clone(),
            repo_root: config.repo_root.clone(),
            runs_dir: config.runs_dir.clone(),
            timeout: Duration::from_secs(config.agent_timeout_secs),
            retry_attempts: config.retry_attempts.max(1),
            backoff: Duration::from_secs(config.retry_backoff_secs),
        }
    }

    async fn call_once(&self, request: &AgentRequest) -> Result<AgentResponse, GatewayError> {
        let prompt = request.prompt();
        let log_dir = self.runs_dir.join(&request.run_id).join(&request.agent_name);
        std::fs::create_dir_all(&log_dir).map_err(|source| GatewayError::LogWriteFailed {
            path: log_dir.clone(),
            source,
        })?;

        let prompt_file = log_dir.join("prompt.md");
        std::fs::write(&prompt_file, &prompt).map_err(|source| {
            GatewayError::LogWriteFailed {
                path: prompt_file.clone(),
                source,
            }
        })?;

        let working_dir = request
            .working_dir
            .clone()
            .unwrap_or_else(|| self.repo_root.clone());

        let mut cmd = Command::new(&self.agent_cmd);
        if let Some(model) = request.model {
            cmd.arg("--model").arg(model.as_str());
        }
        cmd.current_dir(&working_dir)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        debug!(
            agent = %request.agent_name,
            cmd = %self.agent_cmd,
            dir = %working_dir.display(),
            "spawning agent process"
        );

        let mut child = cmd.spawn().map_err(GatewayError::SpawnFailed)?;

        if let Some(mut stdin) = child.stdin.take() {
            // The child may exit before reading the prompt; its exit status
            // reports that case, not the broken pipe.
            if let Err(err) = stdin.write_all(prompt.as_bytes()).await
                && err.kind() != std::io::ErrorKind::BrokenPipe
            {
                return Err(GatewayError::SpawnFailed(err));
            }
            let _ = stdin.shutdown().await;
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| GatewayError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(GatewayError::SpawnFailed)?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        let output_file = log_dir.join("output.log");
        std::fs::write(&output_file, &stdout).map_err(|source| {
            GatewayError::LogWriteFailed {
                path: output_file.clone(),
                source,
            }
        })?;

        if output.status.success() && stdout.is_empty() {
            // An empty success is indistinguishable from a dropped call;
            // treat it as transient.
            return Err(GatewayError::EmptyOutput);
        }

        if !output.status.success() {
            // The agent ran and explicitly failed. Deterministic; the caller
            // decides what to do with it.
            let combined = if stdout.is_empty() { stderr } else { stdout };
            return Ok(AgentResponse {
                success: false,
                output: combined,
            });
        }

        Ok(AgentResponse {
            success: true,
            output: stdout,
        })
    }
}

#[async_trait]
impl AgentGateway for CommandGateway {
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentResponse, GatewayError> {
        let mut last_err: Option<GatewayError> = None;

        for attempt in 1..=self.retry_attempts {
            info!(
                agent = %request.agent_name,
                template = %request.template,
                attempt,
                "invoking agent"
            );

            match self.call_once(request).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_transient() && attempt < self.retry_attempts => {
                    let delay = self.backoff * 2u32.pow(attempt - 1);
                    warn!(
                        agent = %request.agent_name,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "transient agent failure, backing off"
                    );
                    last_err = Some(err);
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_transient() => last_err = Some(err),
                Err(err) => return Err(err),
            }
        }

        let last = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Err(GatewayError::Exhausted {
            attempts: self.retry_attempts,
            last,
        })
    }
}
