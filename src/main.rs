use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docgen::config::{CliOverrides, Config};
use docgen::ui::UiMode;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

mod cmd;

#[derive(Parser)]
#[command(name = "docgen")]
#[command(version, about = "Resumable documentation generation with live progress")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// UI output mode. Overrides docgen.toml and DOCGEN_UI.
    #[arg(long, global = true, value_enum)]
    pub ui: Option<UiMode>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create .docgen/ with a sample config and plan
    Init,
    /// Run the plan, showing live progress
    Run {
        /// Plan file (default: .docgen/plan.toml)
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Restore the last checkpoint and continue where it stopped
        #[arg(long)]
        resume: bool,

        /// Stop at the first failed task
        #[arg(long)]
        fail_fast: bool,
    },
    /// Show the state recorded in the checkpoint
    Status,
    /// Delete the checkpoint
    Reset {
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        let plan = match &self.command {
            Commands::Run { plan, .. } => plan.clone(),
            _ => None,
        };
        CliOverrides {
            verbose: self.verbose,
            ui: self.ui,
            plan,
        }
    }
}

/// Route `tracing` output to `<log_dir>/docgen.log` so it never interleaves with progress bars.
fn init_logging(config: &Config) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.log_dir).context("Failed to create log directory")?;
    let appender = tracing_appender::rolling::never(&config.log_dir, "docgen.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let default_filter = if config.verbose { "docgen=debug" } else { "docgen=info" };
    let json = config.ui_mode == UiMode::Json;
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(
            (!json).then(|| fmt::layer().with_target(false).with_ansi(false).with_writer(writer.clone())),
        )
        .with(json.then(|| fmt::layer().json().with_writer(writer)))
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    if let Commands::Init = cli.command {
        cmd::cmd_init(&project_dir)?;
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::new(project_dir, cli.overrides())?;
    let _guard = init_logging(&config)?;
    tracing::debug!(project_dir = %config.project_dir.display(), ui = %config.ui_mode, "starting");

    match &cli.command {
        Commands::Init => Ok(ExitCode::SUCCESS),
        Commands::Run {
            resume, fail_fast, ..
        } => cmd::cmd_run(&config, *resume, *fail_fast).await,
        Commands::Status => cmd::cmd_status(&config).map(|_| ExitCode::SUCCESS),
        Commands::Reset { force } => cmd::cmd_reset(&config, *force).map(|_| ExitCode::SUCCESS),
    }
}
