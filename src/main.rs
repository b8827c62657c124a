use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "finquest")]
#[command(about = "FinQuest - XP, levels, streaks and achievements for your finances")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.finquest/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the progression database (overrides the config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// User the command applies to
    #[arg(short, long, global = true, default_value = "local")]
    user: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default ~/.finquest/config.toml
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// Grant XP to the user
    Grant {
        amount: i64,

        /// Source label (transaction, savings, admin, achievement:<slug>, ...)
        #[arg(long, default_value = "admin")]
        source: String,
    },

    /// Deduct XP (never lowers the level)
    Deduct { amount: i64 },

    /// Record streak activity
    Streak {
        /// Streak kind (daily_login, daily_transaction, weekly_savings, bank_sync)
        kind: String,

        /// Activity date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<String>,
    },

    /// Claim a pending streak milestone bonus
    Claim { kind: String },

    /// List the user's streaks
    Streaks,

    /// Evaluate achievements now
    Check {
        /// Ignore the check cool-down
        #[arg(long)]
        force: bool,
    },

    /// List unlocked achievements
    Achievements,

    /// Apply a named domain event
    Event {
        name: String,

        /// JSON payload (e.g. '{"amount": -50}' for admin_adjustment)
        #[arg(long)]
        payload: Option<String>,
    },

    /// Show level, XP and title
    Snapshot,

    /// Show or record the user's aggregate financial facts
    Facts {
        /// JSON object of facts to record
        #[arg(long)]
        set: Option<String>,
    },

    /// Manage the achievement catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Import definitions from a .json, .yaml or .toml file
    Import { path: PathBuf },

    /// List all definitions
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Init { force } = cli.command {
        return cli::init::init_command(cli.config.as_deref(), force);
    }

    let ctx = cli::Context::load(cli.config.as_deref(), cli.db, cli.user, cli.json)?;

    match cli.command {
        Commands::Init { .. } => {}
        Commands::Grant { amount, source } => cli::xp::grant_command(&ctx, amount, &source)?,
        Commands::Deduct { amount } => cli::xp::deduct_command(&ctx, amount)?,
        Commands::Snapshot => cli::xp::snapshot_command(&ctx)?,
        Commands::Streak { kind, date } => cli::streak::advance_command(&ctx, &kind, date.as_deref())?,
        Commands::Claim { kind } => cli::streak::claim_command(&ctx, &kind)?,
        Commands::Streaks => cli::streak::list_command(&ctx)?,
        Commands::Check { force } => cli::achievements::check_command(&ctx, force)?,
        Commands::Achievements => cli::achievements::unlocked_command(&ctx)?,
        Commands::Event { name, payload } => cli::event::event_command(&ctx, &name, payload.as_deref())?,
        Commands::Facts { set } => cli::facts::facts_command(&ctx, set.as_deref())?,
        Commands::Catalog { action } => match action {
            CatalogAction::Import { path } => cli::achievements::import_command(&ctx, &path)?,
            CatalogAction::List => cli::achievements::catalog_command(&ctx)?,
        },
    }

    Ok(())
}
