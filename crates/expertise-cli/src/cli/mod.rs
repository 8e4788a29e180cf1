mod commands;

use clap::Parser;
use expertise_core::domain::ExpertiseError;
use tracing_subscriber::EnvFilter;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(args) {
        Ok(code) => code,
        Err(error) => {
            let error = error.as_expertise_error();
            eprintln!("{}", error.diagnostic_line());
            if let Some(summary_line) = error.fatal_exit_line() {
                eprintln!("{}", summary_line);
            }
            error.exit_code()
        }
    }
}

pub fn run<I, S>(args: I) -> Result<i32, CliError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let full_args = std::iter::once("expertise".to_string())
        .chain(args.into_iter().map(Into::into))
        .collect::<Vec<_>>();
    match Cli::try_parse_from(&full_args) {
        Ok(cli) => {
            init_tracing(cli.verbose);
            dispatch_parsed(cli.command)
        }
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

/// `RUST_LOG` wins; otherwise `warn`, or `info` with `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

#[derive(Parser)]
#[command(name = "expertise", about = "Regression-test oracle for simulation run artifacts")]
struct Cli {
    /// Log progress at info level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Run a task over a working directory and write its TaskSummary
    Run(commands::RunArgs),
    /// List registered expert kinds
    Kinds,
    /// Print the digest of a saved TaskSummary
    Show(commands::ShowArgs),
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Run(args) => commands::run_task_command(args),
        CliCommand::Kinds => commands::run_kinds_command(),
        CliCommand::Show(args) => commands::run_show_command(args),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Task(#[from] ExpertiseError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_expertise_error(&self) -> ExpertiseError {
        match self {
            Self::Usage(message) => {
                ExpertiseError::configuration("CONFIG.CLI_USAGE", message.clone())
            }
            Self::Task(error) => error.clone(),
            Self::Internal(error) => ExpertiseError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
