//! The phase pipeline.
//!
//! Drives one run through `plan → build → test → review → document`,
//! persisting state after every completed phase and never before. Each
//! phase re-validates its preconditions on entry, so re-invoking a phase
//! whose work is already recorded is a no-op and a crashed run resumes from
//! the first unmet phase. A precondition failure or a hard gateway fault
//! marks the run failed without touching already-recorded progress.
//!
//! Components are injected once at construction; the pipeline never reaches
//! for ambient globals.

use anyhow::{Result, anyhow};
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;
use tracing::{error, info, warn};

use crate::agent::{AgentGateway, AgentRequest, ModelTier, payload};
use crate::config::Config;
use crate::errors::StateError;
use crate::orchestrator::Phase;
use crate::review::{ReviewOutcome, ReviewResolver};
use crate::state::{RunState, RunStatus, StateStore, new_run_id};
use crate::tracker::IssueTracker;
use crate::workspace::WorkspaceProvider;

/// Plan output names the produced spec like `specs/feat-login-page.md`.
static SPEC_PATH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"specs/[\w-]+\.md").unwrap());

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Abort on blocking review findings instead of patching them.
    pub skip_resolution: bool,
    /// Ask the test template to skip end-to-end suites.
    pub skip_e2e: bool,
}

pub struct Pipeline {
    config: Config,
    store: StateStore,
    workspace: Box<dyn WorkspaceProvider>,
    gateway: Box<dyn AgentGateway>,
    tracker: Box<dyn IssueTracker>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        store: StateStore,
        workspace: Box<dyn WorkspaceProvider>,
        gateway: Box<dyn AgentGateway>,
        tracker: Box<dyn IssueTracker>,
    ) -> Self {
        Self {
            config,
            store,
            workspace,
            gateway,
            tracker,
        }
    }

    /// Planning: the only phase that creates state. Fetches the issue,
    /// classifies it, creates the branch-bound worktree, reserves ports,
    /// bootstraps the workspace, and generates the implementation spec.
    pub async fn plan(&self, issue_ref: &str, run_id: Option<&str>) -> Result<RunState> {
        let run_id = match run_id {
            Some(id) => id.to_string(),
            None => new_run_id(),
        };
        info!(run_id = %run_id, issue = issue_ref, "starting plan phase");

        let mut state = match self.store.load(&run_id)? {
            Some(existing) => existing,
            None => RunState::new(&run_id, issue_ref),
        };
        self.revive(&mut state);

        if state.has_completed(Phase::Plan.label())
            && state.spec_ref.is_some()
            && state.workspace_path.is_some()
            && state.ports.is_some()
        {
            info!(run_id = %run_id, "plan already recorded, nothing to do");
            return Ok(state);
        }

        let issue = match self.tracker.fetch(issue_ref).await {
            Ok(issue) => issue,
            Err(err) => return Err(self.fail(&mut state, Phase::Plan, err.to_string())),
        };
        info!(title = %issue.title, "fetched issue");

        if let Err(err) = self.tracker.update_status(issue_ref, "in-progress").await {
            warn!(error = %err, "could not mark issue in progress");
        }

        if state.issue_class.is_none() {
            let request = AgentRequest::new("issue_classifier", "/classify", &run_id)
                .with_args(vec![issue.number.to_string(), issue.title.clone()]);
            let class = match self.invoke(&mut state, Phase::Plan, &request).await {
                Ok(response) => match normalize_class(&response.output) {
                    Some(class) => class,
                    None => {
                        return Err(self.fail(
                            &mut state,
                            Phase::Plan,
                            format!("unusable issue classification: {:?}", response.output),
                        ));
                    }
                },
                Err(err) => return Err(err),
            };
            info!(class = %class, "issue classified");
            state.issue_class = Some(class);
        }

        let class = state.issue_class.clone().expect("classified above");
        let branch_name = state
            .branch_name
            .clone()
            .unwrap_or_else(|| format!("{class}-issue-{issue_ref}-{run_id}"));

        let workspace_path = match self.workspace.create_workspace(&run_id, &branch_name) {
            Ok(path) => path,
            Err(err) => return Err(self.fail(&mut state, Phase::Plan, err.to_string())),
        };
        state.branch_name = Some(branch_name);
        state.workspace_path = Some(workspace_path.clone());

        if state.ports.is_none() {
            // The allocator persists the reservation into state under the
            // ledger lock; a simultaneously starting run scans past it
            let ports = match self.workspace.allocate_ports(&mut state) {
                Ok(ports) => ports,
                Err(err) => return Err(self.fail(&mut state, Phase::Plan, err.to_string())),
            };
            info!(primary = ports.primary, secondary = ports.secondary, "ports reserved");
        }

        // Workspace and ports are durable before anything runs in them
        self.store.persist(&state)?;

        let ports = state.ports.expect("allocated above");
        let install = AgentRequest::new("workspace_installer", "/install", &run_id).with_args(vec![
            workspace_path.display().to_string(),
            ports.primary.to_string(),
            ports.secondary.to_string(),
        ]);
        let response = self.invoke(&mut state, Phase::Plan, &install).await?;
        if !response.success {
            return Err(self.fail(
                &mut state,
                Phase::Plan,
                format!("workspace install failed: {}", response.output),
            ));
        }

        let plan_request = AgentRequest::new("planner", &format!("/{class}"), &run_id)
            .with_args(vec![issue_ref.to_string(), issue.title.clone()])
            .with_working_dir(workspace_path.clone())
            .with_model(ModelTier::Heavy);
        let response = self.invoke(&mut state, Phase::Plan, &plan_request).await?;
        if !response.success {
            return Err(self.fail(
                &mut state,
                Phase::Plan,
                format!("plan generation failed: {}", response.output),
            ));
        }

        let spec_ref = SPEC_PATH_REGEX
            .find(&response.output)
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| response.output.trim().to_string());
        info!(spec = %spec_ref, "plan produced spec");
        state.spec_ref = Some(spec_ref);

        self.store.save(&mut state, Phase::Plan.label())?;
        Ok(state)
    }

    /// Implementation: drives the `/implement` template against the spec the
    /// plan phase produced.
    pub async fn build(&self, run_id: &str) -> Result<RunState> {
        let mut state = self.load_required(run_id)?;
        self.revive(&mut state);

        if state.has_completed(Phase::Build.label()) && state.plan_ref.is_some() {
            info!(run_id, "build already recorded, nothing to do");
            return Ok(state);
        }

        let workspace_path = self.preconditions(&mut state, Phase::Build)?;
        let spec_ref = match state.spec_ref.clone() {
            Some(spec) => spec,
            None => {
                return Err(self.fail(
                    &mut state,
                    Phase::Build,
                    "no spec recorded by plan phase".to_string(),
                ));
            }
        };

        let request = AgentRequest::new("build_implementor", "/implement", run_id)
            .with_args(vec![spec_ref])
            .with_working_dir(workspace_path)
            .with_model(ModelTier::Heavy);
        let response = self.invoke(&mut state, Phase::Build, &request).await?;
        if !response.success {
            return Err(self.fail(
                &mut state,
                Phase::Build,
                format!("implementation failed: {}", response.output),
            ));
        }

        state.plan_ref = Some(self.output_ref(run_id, "build_implementor"));
        self.store.save(&mut state, Phase::Build.label())?;
        info!(run_id, "build phase completed");
        Ok(state)
    }

    /// Testing: runs the `/test` template. Test failures are soft — they are
    /// recorded in state and deferred to review, never run-ending here.
    pub async fn test(&self, run_id: &str, skip_e2e: bool) -> Result<RunState> {
        let mut state = self.load_required(run_id)?;
        self.revive(&mut state);

        if state.has_completed(Phase::Test.label()) && state.tests_passed.is_some() {
            info!(run_id, "test already recorded, nothing to do");
            return Ok(state);
        }

        let workspace_path = self.preconditions(&mut state, Phase::Test)?;

        let mut args = Vec::new();
        if skip_e2e {
            args.push("skip-e2e".to_string());
        }
        let request = AgentRequest::new("test_validator", "/test", run_id)
            .with_args(args)
            .with_working_dir(workspace_path);
        let response = self.invoke(&mut state, Phase::Test, &request).await?;

        if response.success {
            info!(run_id, "test suite passed");
        } else {
            // Review is the sole gate for blocking the pipeline
            warn!(run_id, "test suite reported failures, deferring to review");
        }
        state.tests_passed = Some(response.success);

        self.store.save(&mut state, Phase::Test.label())?;
        Ok(state)
    }

    /// Review: parses the structured review outcome and, unless skipped,
    /// drives one resolution sub-cycle per blocking finding.
    pub async fn review(&self, run_id: &str, skip_resolution: bool) -> Result<RunState> {
        let mut state = self.load_required(run_id)?;
        self.revive(&mut state);

        if state.has_completed(Phase::Review.label()) && state.review_outcome.is_some() {
            info!(run_id, "review already recorded, nothing to do");
            return Ok(state);
        }

        let workspace_path = self.preconditions(&mut state, Phase::Review)?;
        let spec_ref = match state.spec_ref.clone() {
            Some(spec) => spec,
            None => {
                return Err(self.fail(
                    &mut state,
                    Phase::Review,
                    "no spec recorded by plan phase".to_string(),
                ));
            }
        };

        // The producing phase owns the evidence location; consumers read it
        // from state instead of probing the filesystem.
        let evidence_dir = self.config.artifact_dir(run_id, Phase::Review.label());
        if let Err(err) = std::fs::create_dir_all(&evidence_dir) {
            return Err(self.fail(
                &mut state,
                Phase::Review,
                format!("cannot create evidence dir: {err}"),
            ));
        }
        state.evidence_dir = Some(evidence_dir.clone());

        let request = AgentRequest::new("review_agent", "/review", run_id)
            .with_args(vec![
                run_id.to_string(),
                spec_ref.clone(),
                evidence_dir.display().to_string(),
            ])
            .with_working_dir(workspace_path.clone());
        let response = self.invoke(&mut state, Phase::Review, &request).await?;
        if !response.success {
            return Err(self.fail(
                &mut state,
                Phase::Review,
                format!("review failed to execute: {}", response.output),
            ));
        }

        let mut outcome: ReviewOutcome = match payload::parse_payload(&response.output) {
            Ok(outcome) => outcome,
            Err(err) => {
                return Err(self.fail(
                    &mut state,
                    Phase::Review,
                    format!("unparseable review outcome: {err}"),
                ));
            }
        };
        info!(summary = %outcome.review_summary, issues = outcome.review_issues.len(), "review completed");

        let resolver = ReviewResolver::new(self.gateway.as_ref(), skip_resolution);
        match resolver
            .resolve(run_id, &workspace_path, Some(&spec_ref), &mut outcome)
            .await
        {
            Ok(0) => {}
            Ok(patched) => info!(patched, "blocking findings resolved"),
            Err(err) => {
                state.review_outcome = Some(outcome);
                return Err(self.fail(&mut state, Phase::Review, err.to_string()));
            }
        }

        state.review_outcome = Some(outcome);
        self.store.save(&mut state, Phase::Review.label())?;
        Ok(state)
    }

    /// Documentation: the final phase; on success the run is complete.
    pub async fn document(&self, run_id: &str) -> Result<RunState> {
        let mut state = self.load_required(run_id)?;
        self.revive(&mut state);

        if state.has_completed(Phase::Document.label()) && state.docs_ref.is_some() {
            info!(run_id, "document already recorded, nothing to do");
            return Ok(state);
        }

        let workspace_path = self.preconditions(&mut state, Phase::Document)?;

        let spec_ref = state.spec_ref.clone().unwrap_or_else(|| {
            warn!("no spec recorded, documenting without spec reference");
            String::new()
        });
        let evidence = state
            .evidence_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        let request = AgentRequest::new("documentation_writer", "/document", run_id)
            .with_args(vec![run_id.to_string(), spec_ref, evidence])
            .with_working_dir(workspace_path);
        let response = self.invoke(&mut state, Phase::Document, &request).await?;
        if !response.success {
            return Err(self.fail(
                &mut state,
                Phase::Document,
                format!("documentation generation failed: {}", response.output),
            ));
        }

        state.docs_ref = Some(response.output.trim().to_string());
        state.status = RunStatus::Completed;
        self.store.save(&mut state, Phase::Document.label())?;
        info!(run_id, "run completed");
        Ok(state)
    }

    /// Run every phase in order, resuming from the first unmet one.
    pub async fn run_all(
        &self,
        issue_ref: &str,
        run_id: Option<&str>,
        options: PipelineOptions,
    ) -> Result<RunState> {
        let state = self.plan(issue_ref, run_id).await?;
        let run_id = state.run_id.clone();

        self.build(&run_id).await?;
        self.test(&run_id, options.skip_e2e).await?;
        self.review(&run_id, options.skip_resolution).await?;
        self.document(&run_id).await
    }

    /// Current state for display.
    pub fn status(&self, run_id: &str) -> Result<RunState> {
        self.load_required(run_id)
    }

    fn load_required(&self, run_id: &str) -> Result<RunState> {
        match self.store.load(run_id)? {
            Some(state) => Ok(state),
            None => Err(StateError::Missing {
                run_id: run_id.to_string(),
            }
            .into()),
        }
    }

    /// A failed run stays resumable: re-invoking a phase clears the
    /// absorbing status before any new work is attempted.
    fn revive(&self, state: &mut RunState) {
        if state.status == RunStatus::Failed {
            info!(run_id = %state.run_id, "resuming previously failed run");
            state.status = RunStatus::Active;
        }
    }

    /// Shared forward-transition preconditions: the prior phase's label must
    /// be recorded and the workspace must validate — before any agent call.
    fn preconditions(&self, state: &mut RunState, phase: Phase) -> Result<PathBuf> {
        if let Some(prior) = phase.prior()
            && !state.has_completed(prior.label())
        {
            return Err(self.fail(
                state,
                phase,
                format!("prior phase {prior} has not completed"),
            ));
        }

        let run_id = state.run_id.clone();
        if let Err(err) = self.workspace.validate(&run_id, state) {
            return Err(self.fail(state, phase, err.to_string()));
        }

        Ok(state
            .workspace_path
            .clone()
            .expect("validated workspace has a path"))
    }

    /// Invoke the gateway, converting a hard gateway fault into a failed
    /// run. Deterministic agent refusals come back as `success = false` for
    /// the phase to judge.
    async fn invoke(
        &self,
        state: &mut RunState,
        phase: Phase,
        request: &AgentRequest,
    ) -> Result<crate::agent::AgentResponse> {
        match self.gateway.invoke(request).await {
            Ok(response) => Ok(response),
            Err(err) => Err(self.fail(state, phase, err.to_string())),
        }
    }

    /// Persist the failed status (recorded progress is never rolled back)
    /// and produce the error the phase process exits with.
    fn fail(&self, state: &mut RunState, phase: Phase, reason: String) -> anyhow::Error {
        state.status = RunStatus::Failed;
        if let Err(err) = self.store.persist(state) {
            error!(error = %err, "could not persist failed run state");
        }
        error!(run_id = %state.run_id, %phase, %reason, "run failed");
        anyhow!("run {} failed in {} phase: {}", state.run_id, phase, reason)
    }

    fn output_ref(&self, run_id: &str, agent_name: &str) -> String {
        self.config
            .runs_dir
            .join(run_id)
            .join(agent_name)
            .join("output.log")
            .display()
            .to_string()
    }
}

/// Reduce the classifier's free-text answer to a branch-safe class slug.
fn normalize_class(output: &str) -> Option<String> {
    let token = output
        .trim()
        .lines()
        .next()?
        .trim()
        .trim_start_matches('/')
        .split_whitespace()
        .next()?
        .to_lowercase();

    let slug: String = token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();

    if slug.is_empty() { None } else { Some(slug) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_class_variants() {
        assert_eq!(normalize_class("/feature"), Some("feature".into()));
        assert_eq!(normalize_class("  Bug  \n"), Some("bug".into()));
        assert_eq!(
            normalize_class("chore — dependency bump"),
            Some("chore".into())
        );
        assert_eq!(normalize_class("\n\n"), None);
        assert_eq!(normalize_class("!!!"), None);
    }

    #[test]
    fn test_spec_path_regex() {
        let output = "Plan written.\nSee specs/feat-login-page.md for details.";
        let found = SPEC_PATH_REGEX.find(output).unwrap();
        assert_eq!(found.as_str(), "specs/feat-login-page.md");

        assert!(SPEC_PATH_REGEX.find("no spec path here").is_none());
    }
}
