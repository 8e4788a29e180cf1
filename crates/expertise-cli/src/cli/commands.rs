use super::CliError;
use anyhow::Context;
use expertise_core::domain::{ExpertiseError, Workspace};
use expertise_core::experts::registered_kinds;
use expertise_core::summary::to_pretty_json;
use expertise_core::task::{TaskConfig, TaskRunner, TaskSummary, render_human_summary};
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(clap::Args)]
pub(super) struct RunArgs {
    /// Task configuration (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Working directory holding the run artifacts
    #[arg(long, default_value = ".")]
    workdir: PathBuf,

    /// TaskSummary path (default: the configured name inside the working directory)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
pub(super) struct ShowArgs {
    /// Saved TaskSummary document
    #[arg(value_name = "task_summary.json")]
    summary: PathBuf,
}

pub(super) fn run_task_command(args: RunArgs) -> Result<i32, CliError> {
    let config = TaskConfig::from_path(&args.config).map_err(ExpertiseError::from)?;
    let workdir = fs::canonicalize(&args.workdir).with_context(|| {
        format!(
            "working directory '{}' is not accessible",
            args.workdir.display()
        )
    })?;
    let workspace = Workspace::open(workdir)?;

    info!(
        config = %args.config.display(),
        workdir = %workspace.root().display(),
        experts = config.experts.len(),
        "running task"
    );
    let mut runner = TaskRunner::new(config)?;
    let (summary, path) = runner.run_and_save(&workspace, args.output.as_deref())?;

    println!("{}", render_human_summary(&summary)?);
    for (label, expected) in runner.expected_results()? {
        let rendered = to_pretty_json(&expected).map_err(ExpertiseError::from)?;
        println!("EXPECTED_RESULT {}: {}", label, rendered.trim_end());
    }
    println!("TaskSummary: {}", path.display());

    Ok(verdict_exit_code(&summary)?)
}

pub(super) fn run_kinds_command() -> Result<i32, CliError> {
    for (kind, variant) in registered_kinds() {
        let role = if variant.default_side_expert() {
            " (side)"
        } else {
            ""
        };
        println!("{}\t{}{}", kind, variant.name(), role);
    }
    Ok(0)
}

pub(super) fn run_show_command(args: ShowArgs) -> Result<i32, CliError> {
    let summary = TaskSummary::load(&args.summary)?;
    println!("{}", render_human_summary(&summary)?);
    Ok(verdict_exit_code(&summary)?)
}

fn verdict_exit_code(summary: &TaskSummary) -> Result<i32, ExpertiseError> {
    Ok(match summary.overall_verdict()? {
        Some(false) => 1,
        Some(true) | None => 0,
    })
}
