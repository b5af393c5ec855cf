//! The contract with the external code-generation agent.
//!
//! Every phase talks to the agent through one choke point,
//! [`AgentGateway::invoke`]. Requests are built fresh per call; responses
//! are parsed immediately by the calling phase and never retained in run
//! state.

pub mod gateway;
pub mod payload;

pub use gateway::{AgentGateway, CommandGateway};

use std::path::PathBuf;

/// Model tier hint forwarded to the agent command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Base,
    Heavy,
}

impl ModelTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Heavy => "heavy",
        }
    }
}

/// A templated instruction for the agent.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Name used for per-call artifact files, e.g. `review_agent`.
    pub agent_name: String,
    /// Instruction template, e.g. `/implement`.
    pub template: String,
    /// Positional template arguments.
    pub args: Vec<String>,
    pub run_id: String,
    /// Workspace the agent operates in; defaults to the gateway's repo root.
    pub working_dir: Option<PathBuf>,
    pub model: Option<ModelTier>,
}

impl AgentRequest {
    pub fn new(agent_name: &str, template: &str, run_id: &str) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            template: template.to_string(),
            args: Vec::new(),
            run_id: run_id.to_string(),
            working_dir: None,
            model: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_working_dir(mut self, dir: PathBuf) -> Self {
        self.working_dir = Some(dir);
        self
    }

    pub fn with_model(mut self, model: ModelTier) -> Self {
        self.model = Some(model);
        self
    }

    /// The prompt line handed to the agent: template followed by its
    /// positional arguments.
    pub fn prompt(&self) -> String {
        if self.args.is_empty() {
            self.template.clone()
        } else {
            format!("{} {}", self.template, self.args.join(" "))
        }
    }
}

/// What the agent handed back: a success flag and free-form output, which
/// may contain an embedded structured block the calling phase extracts.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub success: bool,
    pub output: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_without_args() {
        let request = AgentRequest::new("test_validator", "/test", "ab12cd34");
        assert_eq!(request.prompt(), "/test");
    }

    #[test]
    fn test_prompt_joins_args() {
        let request = AgentRequest::new("review_agent", "/review", "ab12cd34")
            .with_args(vec!["ab12cd34".into(), "specs/feat.md".into()]);
        assert_eq!(request.prompt(), "/review ab12cd34 specs/feat.md");
    }

    #[test]
    fn test_builder_fields() {
        let request = AgentRequest::new("planner", "/plan", "ab12cd34")
            .with_working_dir("/tmp/trees/ab12cd34".into())
            .with_model(ModelTier::Heavy);
        assert_eq!(
            request.working_dir.as_deref(),
            Some(std::path::Path::new("/tmp/trees/ab12cd34"))
        );
        assert_eq!(request.model, Some(ModelTier::Heavy));
        assert_eq!(ModelTier::Heavy.as_str(), "heavy");
    }
}
