use std::path::PathBuf;

use anyhow::Result;
use autopush_core::configs::push::PushOverrides;
use autopush_core::push_manager::{PushManager, PushManagerConfig};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

/// Autopush - stage, commit and push a git repository on a timer
#[derive(Parser)]
#[command(name = "autopush")]
#[command(about = "Repeatedly stage, commit and push a git repository with bounded timeouts")]
#[command(version)]
struct Cli {
    /// Path to the repository root (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    repo: PathBuf,

    /// Config file (defaults to autopush.yml in the repository root)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Emit diagnostics as JSON lines
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run add/commit/push repeatedly
    Run(RunArgs),
    /// Run a single add/commit/push cycle
    Once {
        /// Commit message (defaults to the configured prefix and a timestamp)
        #[arg(short, long)]
        message: Option<String>,
        /// Append JSON-lines run records to this file
        #[arg(long)]
        log_file: Option<PathBuf>,
    },
    /// Check the repository and git identity without changing anything
    Check,
    /// Print the JSON schema of the config file
    Schema,
}

#[derive(Args)]
struct RunArgs {
    /// Number of pushes
    #[arg(long)]
    count: Option<u32>,
    /// Seconds to wait between pushes
    #[arg(long)]
    interval: Option<u64>,
    /// Add up to this many extra pushes at random
    #[arg(long)]
    jitter: Option<u32>,
    /// Commit message prefix
    #[arg(long)]
    message_prefix: Option<String>,
    /// Stop the batch after any failed push, not only after timeouts
    #[arg(long)]
    stop_on_failure: bool,
    /// Skip pushes when the working tree is clean
    #[arg(long)]
    skip_unchanged: bool,
    /// Append JSON-lines run records to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl RunArgs {
    fn to_overrides(&self) -> PushOverrides {
        PushOverrides {
            count: self.count,
            interval_secs: self.interval,
            jitter: self.jitter,
            message_prefix: self.message_prefix.clone(),
            stop_on_failure: self.stop_on_failure.then_some(true),
            skip_unchanged: self.skip_unchanged.then_some(true),
            log_file: self.log_file.clone(),
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    tracing::debug!(repo = %cli.repo.display(), "starting autopush");

    let overrides = match cli.command {
        Commands::Schema => return commands::schema::execute(),
        Commands::Run(ref args) => args.to_overrides(),
        Commands::Once { ref log_file, .. } => PushOverrides {
            log_file: log_file.clone(),
            ..PushOverrides::default()
        },
        Commands::Check => PushOverrides::default(),
    };

    // Configuration and repository resolution live in the core
    let manager = PushManager::new(PushManagerConfig {
        repo: cli.repo,
        config_path: cli.config,
        overrides,
    })
    .map_err(|e| anyhow::anyhow!("Failed to initialize: {}", e))?;

    // Execute command (CLI layer only handles presentation)
    match cli.command {
        Commands::Run(_) => commands::run::execute(&manager).await,
        Commands::Once { message, .. } => commands::once::execute(&manager, message.as_deref()).await,
        Commands::Check => commands::check::execute(&manager).await,
        Commands::Schema => commands::schema::execute(),
    }
}
