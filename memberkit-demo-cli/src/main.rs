//! Memberkit Demo CLI
//!
//! Command-line interface for testing and demonstrating the membership
//! subscription core.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod ui;

#[derive(Parser)]
#[command(name = "memberkit-demo")]
#[command(about = "Memberkit Demo CLI - browse plans and manage subscriptions", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Custom storage directory (can also be set via MEMBERKIT_DEMO_DIR env var)
    #[arg(long, global = true)]
    storage_dir: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and sign in
    Register {
        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Email address
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Sign in with an existing account
    Login {
        /// Email address
        #[arg(short, long)]
        email: Option<String>,
    },

    /// Sign out
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Browse the plan catalog
    Plans {
        /// Only show plans in this category
        #[arg(long)]
        category: Option<String>,
    },

    /// Show one plan in detail
    Plan {
        /// Plan identifier (e.g. fit-basic)
        plan_id: String,
    },

    /// Subscribe to a plan
    Subscribe {
        /// Plan identifier (e.g. fit-basic)
        plan_id: String,

        /// Bill yearly instead of monthly
        #[arg(long)]
        yearly: bool,
    },

    /// Cancel the subscription to one plan
    Cancel {
        /// Plan identifier
        plan_id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Cancel every active subscription
    CancelAll {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Show profile and subscriptions
    Profile {
        /// Include cancelled subscriptions
        #[arg(long)]
        all: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let storage_dir = resolve_storage_dir(cli.storage_dir.as_deref())?;

    match cli.command {
        Commands::Register { name, email } => {
            commands::auth::register(&storage_dir, name, email).await
        }
        Commands::Login { email } => commands::auth::login(&storage_dir, email).await,
        Commands::Logout => commands::auth::logout(&storage_dir).await,
        Commands::Whoami => commands::auth::whoami(&storage_dir).await,
        Commands::Plans { category } => commands::plans::list(&storage_dir, category).await,
        Commands::Plan { plan_id } => commands::plans::show(&storage_dir, &plan_id).await,
        Commands::Subscribe { plan_id, yearly } => {
            commands::subscriptions::subscribe(&storage_dir, &plan_id, yearly).await
        }
        Commands::Cancel { plan_id, yes } => {
            commands::subscriptions::cancel(&storage_dir, &plan_id, yes).await
        }
        Commands::CancelAll { yes } => commands::subscriptions::cancel_all(&storage_dir, yes).await,
        Commands::Profile { all } => commands::profile::show(&storage_dir, all).await,
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "memberkit=debug,info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

fn resolve_storage_dir(flag: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(dir) = std::env::var("MEMBERKIT_DEMO_DIR") {
        return Ok(PathBuf::from(dir));
    }
    let base = dirs::data_dir().ok_or_else(|| anyhow!("could not determine a data directory"))?;
    Ok(base.join("memberkit-demo"))
}
