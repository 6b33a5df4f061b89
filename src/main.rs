mod commands;
mod lock;
mod registry;
mod render;
mod utils;

use anyhow::Result;
use calmirror_core::config::MirrorConfig;
use calmirror_core::date_range::DateRange;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "calmirror", version)]
#[command(about = "Mirror events across your calendars so each one shows all of your busy time")]
struct Cli {
    /// Log more (-v for info, -vv for debug). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect a Google, Outlook or iCloud account
    Auth {
        /// Provider to authenticate with ("google", "outlook" or "icloud")
        provider: String,
    },
    /// List configured calendars
    Calendars,
    /// Show what a sync would create or update, without writing anything
    Status {
        /// Start of the window: "start" for unbounded, "now", or YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,

        /// End of the window (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// List every planned event instead of counts
        #[arg(short, long)]
        all: bool,
    },
    /// Mirror events between every pair of configured calendars
    Sync {
        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,

        /// Per-calendar fetch cap (overrides max_events from config)
        #[arg(long)]
        max_events: Option<usize>,

        /// Only create missing copies, never move existing ones
        #[arg(long)]
        no_updates: bool,

        /// Record failing writes and carry on instead of stopping at the first one
        #[arg(long)]
        keep_going: bool,
    },
    /// Delete every mirrored copy from one calendar
    Clean {
        /// Calendar name, as in config.toml
        calendar: String,

        #[arg(long)]
        from: Option<String>,

        #[arg(long)]
        to: Option<String>,

        /// List the copies that would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Auth { provider } => commands::auth::run(&provider).await,
        Commands::Calendars => commands::calendars::run(&MirrorConfig::load()?),
        Commands::Status { from, to, all } => {
            let config = require_calendars()?;
            let range = resolve_range(&config, from.as_deref(), to.as_deref())?;
            commands::status::run(&config, range, all).await
        }
        Commands::Sync {
            from,
            to,
            max_events,
            no_updates,
            keep_going,
        } => {
            let config = require_calendars()?;
            let range = resolve_range(&config, from.as_deref(), to.as_deref())?;
            let args = commands::sync::SyncArgs {
                range,
                max_events,
                no_updates,
                keep_going,
            };
            commands::sync::run(&config, args).await
        }
        Commands::Clean {
            calendar,
            from,
            to,
            dry_run,
        } => {
            let config = MirrorConfig::load()?;
            let range = resolve_range(&config, from.as_deref(), to.as_deref())?;
            commands::clean::run(&config, &calendar, range, dry_run).await
        }
    }
}

fn resolve_range(config: &MirrorConfig, from: Option<&str>, to: Option<&str>) -> Result<DateRange> {
    DateRange::from_args(from, to, config.horizon_days).map_err(|e| anyhow::anyhow!(e))
}

/// Load config and make sure there is something to mirror.
fn require_calendars() -> Result<MirrorConfig> {
    let config = MirrorConfig::load()?;

    if config.calendars.len() < 2 {
        anyhow::bail!(
            "Mirroring needs at least two calendars, found {} in {}.\n\
            Run `calmirror auth <google|outlook|icloud>` and add the printed [[calendars]] entries.",
            config.calendars.len(),
            MirrorConfig::config_path()?.display()
        );
    }

    Ok(config)
}
