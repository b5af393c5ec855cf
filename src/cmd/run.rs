//! Phase commands — `runway plan|build|test|review|document|run`.
//!
//! Each command wires the concrete components into a
//! [`runway::orchestrator::Pipeline`] and prints a closing summary; the
//! pipeline owns the semantics.

use anyhow::Result;
use std::path::PathBuf;

use super::super::Cli;
use runway::agent::CommandGateway;
use runway::config::Config;
use runway::orchestrator::{Pipeline, PipelineOptions};
use runway::state::{RunState, StateStore};
use runway::tracker::GhIssueTracker;
use runway::workspace::GitWorkspaceAllocator;

pub fn build_pipeline(repo_root: PathBuf, verbose: bool) -> Result<Pipeline> {
    let config = Config::new(repo_root, verbose)?;
    config.ensure_directories()?;

    let store = StateStore::new(config.runs_dir.clone());
    let workspace = GitWorkspaceAllocator::from_config(&config);
    let gateway = CommandGateway::from_config(&config);
    let tracker = GhIssueTracker::new(config.repo_root.clone());

    Ok(Pipeline::new(
        config,
        store,
        Box::new(workspace),
        Box::new(gateway),
        Box::new(tracker),
    ))
}

/// Phase commands name both the issue and the run; refuse to drive a run
/// that was planned for a different issue.
fn ensure_issue_matches(pipeline: &Pipeline, run_id: &str, issue: &str) -> Result<()> {
    let state = pipeline.status(run_id)?;
    if state.issue_ref != issue {
        anyhow::bail!(
            "run {} belongs to issue {}, not issue {}",
            run_id,
            state.issue_ref,
            issue
        );
    }
    Ok(())
}

fn print_summary(phase: &str, state: &RunState) {
    println!();
    println!(
        "{}",
        console::style(format!("=== {} PHASE COMPLETED ===", phase.to_uppercase()))
            .bold()
            .green()
    );
    println!("Run:    {}", state.run_id);
    println!("Issue:  {}", state.issue_ref);
    if let Some(path) = &state.workspace_path {
        println!("Tree:   {}", path.display());
    }
    if let Some(branch) = &state.branch_name {
        println!("Branch: {branch}");
    }
    if let Some(spec) = &state.spec_ref {
        println!("Spec:   {spec}");
    }
    println!();
}

pub async fn cmd_plan(
    cli: &Cli,
    repo_root: PathBuf,
    issue: &str,
    run_id: Option<&str>,
) -> Result<()> {
    let pipeline = build_pipeline(repo_root, cli.verbose)?;
    let state = pipeline.plan(issue, run_id).await?;
    print_summary("plan", &state);
    if let Some(ports) = state.ports {
        println!("Ports:  {} / {}", ports.primary, ports.secondary);
        println!();
    }
    Ok(())
}

pub async fn cmd_build(cli: &Cli, repo_root: PathBuf, issue: &str, run_id: &str) -> Result<()> {
    let pipeline = build_pipeline(repo_root, cli.verbose)?;
    ensure_issue_matches(&pipeline, run_id, issue)?;
    let state = pipeline.build(run_id).await?;
    print_summary("build", &state);
    Ok(())
}

pub async fn cmd_test(
    cli: &Cli,
    repo_root: PathBuf,
    issue: &str,
    run_id: &str,
    skip_e2e: bool,
) -> Result<()> {
    let pipeline = build_pipeline(repo_root, cli.verbose)?;
    ensure_issue_matches(&pipeline, run_id, issue)?;
    let state = pipeline.test(run_id, skip_e2e).await?;
    print_summary("test", &state);
    match state.tests_passed {
        Some(true) => println!("Tests:  {}", console::style("passed").green()),
        Some(false) => println!(
            "Tests:  {} (deferred to review)",
            console::style("failed").yellow()
        ),
        None => {}
    }
    println!();
    Ok(())
}

pub async fn cmd_review(
    cli: &Cli,
    repo_root: PathBuf,
    issue: &str,
    run_id: &str,
    skip_resolution: bool,
) -> Result<()> {
    let pipeline = build_pipeline(repo_root, cli.verbose)?;
    ensure_issue_matches(&pipeline, run_id, issue)?;
    let state = pipeline.review(run_id, skip_resolution).await?;
    print_summary("review", &state);
    if let Some(outcome) = &state.review_outcome {
        println!("Review: {}", outcome.review_summary);
        let blockers = outcome.blocking().len();
        if blockers > 0 {
            println!(
                "        {}",
                console::style(format!("{blockers} blocking finding(s) remain")).red()
            );
        }
        println!();
    }
    Ok(())
}

pub async fn cmd_document(cli: &Cli, repo_root: PathBuf, issue: &str, run_id: &str) -> Result<()> {
    let pipeline = build_pipeline(repo_root, cli.verbose)?;
    ensure_issue_matches(&pipeline, run_id, issue)?;
    let state = pipeline.document(run_id).await?;
    print_summary("document", &state);
    if let Some(docs) = &state.docs_ref {
        println!("Docs:   {docs}");
        println!();
    }
    Ok(())
}

pub async fn cmd_run(
    cli: &Cli,
    repo_root: PathBuf,
    issue: &str,
    run_id: Option<&str>,
    skip_resolution: bool,
    skip_e2e: bool,
) -> Result<()> {
    let pipeline = build_pipeline(repo_root, cli.verbose)?;
    let options = PipelineOptions {
        skip_resolution,
        skip_e2e,
    };
    let state = pipeline.run_all(issue, run_id, options).await?;
    print_summary("run", &state);
    Ok(())
}
