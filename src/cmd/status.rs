//! Run inspection — `runway status <run-id>`.

use anyhow::Result;
use std::path::PathBuf;

use super::super::Cli;
use super::run::build_pipeline;
use runway::orchestrator::Phase;
use runway::state::RunStatus;

pub fn cmd_status(cli: &Cli, repo_root: PathBuf, run_id: &str) -> Result<()> {
    let pipeline = build_pipeline(repo_root, cli.verbose)?;
    let state = pipeline.status(run_id)?;

    let status = match state.status {
        RunStatus::Active => console::style("active").cyan(),
        RunStatus::Failed => console::style("failed").red(),
        RunStatus::Completed => console::style("completed").green(),
    };

    println!();
    println!("{}", console::style(format!("Run {}", state.run_id)).bold());
    println!("Status:   {status}");
    println!("Issue:    {}", state.issue_ref);
    if let Some(class) = &state.issue_class {
        println!("Class:    {class}");
    }
    if let Some(branch) = &state.branch_name {
        println!("Branch:   {branch}");
    }
    if let Some(path) = &state.workspace_path {
        println!("Tree:     {}", path.display());
    }
    if let Some(ports) = state.ports {
        println!("Ports:    {} / {}", ports.primary, ports.secondary);
    }
    if let Some(spec) = &state.spec_ref {
        println!("Spec:     {spec}");
    }
    if let Some(plan) = &state.plan_ref {
        println!("Log:      {plan}");
    }
    if let Some(passed) = state.tests_passed {
        println!("Tests:    {}", if passed { "passed" } else { "failed" });
    }
    if let Some(outcome) = &state.review_outcome {
        let blockers = outcome.blocking().len();
        println!(
            "Review:   {} ({} blocking)",
            if outcome.success { "passed" } else { "failed" },
            blockers
        );
    }
    if let Some(docs) = &state.docs_ref {
        println!("Docs:     {docs}");
    }

    println!();
    if state.phase_history.is_empty() {
        println!("No phases completed yet.");
    } else {
        println!("Completed: {}", state.phase_history.join(", "));
    }
    if state.status != RunStatus::Completed
        && let Some(next) = Phase::first_unmet(&state)
    {
        println!("Next:     {next}");
    }
    println!("Updated:  {}", state.updated_at.to_rfc3339());
    println!();

    Ok(())
}
