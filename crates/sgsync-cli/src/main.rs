use clap::{ArgAction, Parser, Subcommand};
use commands::{clear, daemon, jobs, status, sync};
use sgsync_config::{Config, PathManager};
use sgsync_models::ShowId;

mod commands;
mod logging;
mod output;

#[derive(Parser)]
#[command(name = "sgsync")]
#[command(about = "sgsync - Keep your watched shows in sync with the cloud and trakt")]
#[command(version)]
struct Cli {
    /// Enable verbose output (use multiple times for more verbosity: -v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "human", value_enum)]
    output: output::OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one sync now
    #[command(long_about = "Send pending local changes, then reconcile flags, lists and movies with the authoritative remote. Without flags a delta sync runs, which skips data that has not changed since the last run.")]
    Sync {
        /// Download everything, ignoring the saved cursors
        #[arg(long, action = ArgAction::SetTrue, conflicts_with = "show")]
        full: bool,

        /// Only refresh the metadata of one show
        #[arg(long, value_name = "SHOW_ID")]
        show: Option<ShowId>,
    },
    /// Keep syncing on the configured interval
    #[command(long_about = "Run sgsync in the foreground and sync periodically. Failed runs are retried with exponential backoff. The daemon performs a full sync on startup unless --no-startup-sync is given. Stop it with Ctrl-C.")]
    Daemon {
        /// Skip the initial sync on startup
        #[arg(long, action = ArgAction::SetTrue)]
        no_startup_sync: bool,
    },
    /// Show local changes waiting to be sent
    #[command(long_about = "List the pending job queue, oldest first. With --drain the jobs are sent to the configured remotes before listing what is left.")]
    Jobs {
        /// Send pending jobs now
        #[arg(long, action = ArgAction::SetTrue)]
        drain: bool,
    },
    /// Show cursors, merge state and failure count
    Status,
    /// Clear sync state
    #[command(long_about = "Clear saved sync state. Use --cursors to force a full download on the next run, --state to also forget the initial merges and failure count, --credentials to remove stored tokens, or --all to clear everything.")]
    Clear {
        /// Clear state and credentials
        #[arg(long, action = ArgAction::SetTrue, conflicts_with_all = ["cursors", "state", "credentials"])]
        all: bool,

        /// Clear sync cursors
        #[arg(long, action = ArgAction::SetTrue)]
        cursors: bool,

        /// Clear cursors, merge flags and failure count
        #[arg(long, action = ArgAction::SetTrue)]
        state: bool,

        /// Clear stored credentials
        #[arg(long, action = ArgAction::SetTrue)]
        credentials: bool,
    },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let path_manager = PathManager::default();
    let logging_config = Config::load_from_file(&path_manager.config_file())
        .map(|config| config.logging)
        .unwrap_or_default();

    // The daemon logs to a rotated file, everything else to stderr
    let log_file = match cli.command {
        Commands::Daemon { .. } => Some(
            logging_config
                .file
                .clone()
                .unwrap_or_else(|| path_manager.daemon_log_file()),
        ),
        _ => None,
    };
    logging::init_logging_with_file(cli.verbose, cli.quiet, log_file.as_deref(), &logging_config)
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let output = output::Output::new(cli.output, cli.quiet);

    match cli.command {
        Commands::Sync { full, show } => sync::run_sync(full, show, &output).await,
        Commands::Daemon { no_startup_sync } => daemon::run_daemon(no_startup_sync, &output).await,
        Commands::Jobs { drain } => jobs::run_jobs(drain, &output).await,
        Commands::Status => status::run_status(&output).await,
        Commands::Clear {
            all,
            cursors,
            state,
            credentials,
        } => clear::run_clear(all, cursors, state, credentials, &output).await,
    }
}
