use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "runway")]
#[command(version, about = "Isolated agentic development runs, phase by phase")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Primary repository root (defaults to the current directory)
    #[arg(long, global = true)]
    pub repo_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify an issue, create an isolated workspace, and generate a spec
    Plan {
        /// Issue reference, e.g. a tracker issue number
        issue: String,
        /// Resume an existing run instead of minting a new identifier
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Implement the spec produced by the plan phase
    Build {
        issue: String,
        run_id: String,
    },
    /// Run the test suite; failures are recorded, not fatal
    Test {
        issue: String,
        run_id: String,
        /// Skip end-to-end suites
        #[arg(long)]
        skip_e2e: bool,
    },
    /// Review the implementation and patch blocking findings
    Review {
        issue: String,
        run_id: String,
        /// Abort on blocking findings instead of patching them
        #[arg(long)]
        skip_resolution: bool,
    },
    /// Generate documentation and complete the run
    Document {
        issue: String,
        run_id: String,
    },
    /// Drive every phase in order for one issue
    Run {
        issue: String,
        /// Resume an existing run instead of minting a new identifier
        #[arg(long)]
        run_id: Option<String>,
        #[arg(long)]
        skip_resolution: bool,
        #[arg(long)]
        skip_e2e: bool,
    },
    /// Show the recorded state of a run
    Status {
        run_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let repo_root = match cli.repo_root.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Plan { issue, run_id } => {
            cmd::cmd_plan(&cli, repo_root, issue, run_id.as_deref()).await?;
        }
        Commands::Build { issue, run_id } => {
            cmd::cmd_build(&cli, repo_root, issue, run_id).await?;
        }
        Commands::Test {
            issue,
            run_id,
            skip_e2e,
        } => {
            cmd::cmd_test(&cli, repo_root, issue, run_id, *skip_e2e).await?;
        }
        Commands::Review {
            issue,
            run_id,
            skip_resolution,
        } => {
            cmd::cmd_review(&cli, repo_root, issue, run_id, *skip_resolution).await?;
        }
        Commands::Document { issue, run_id } => {
            cmd::cmd_document(&cli, repo_root, issue, run_id).await?;
        }
        Commands::Run {
            issue,
            run_id,
            skip_resolution,
            skip_e2e,
        } => {
            cmd::cmd_run(
                &cli,
                repo_root,
                issue,
                run_id.as_deref(),
                *skip_resolution,
                *skip_e2e,
            )
            .await?;
        }
        Commands::Status { run_id } => cmd::cmd_status(&cli, repo_root, run_id)?,
    }

    Ok(())
}
