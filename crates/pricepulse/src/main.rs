// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PricePulse - daily price insights, delivered.
//!
//! This is the binary entry point: the long-running service plus the
//! operator commands that act on the same database.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod ops;
mod serve;
mod services;
mod shutdown;
mod status;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};

use pricepulse_config::PulseConfig;

/// PricePulse - schedules price insights and fans them out to users.
#[derive(Parser, Debug)]
#[command(name = "pricepulse", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scheduler and the delivery workers until SIGINT/SIGTERM.
    Serve,
    /// Run one scheduler evaluation and print what it created.
    Evaluate {
        /// Evaluate as of this instant (RFC 3339) instead of now. Bypasses the window lock.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Dispatch one job, or every pending job that is due.
    Dispatch {
        /// Job to dispatch. Omit to drain the pending queue once.
        job_id: Option<String>,
    },
    /// Move a failed job back to pending.
    Requeue { job_id: String },
    /// Give up on a failed job for good.
    Abandon { job_id: String },
    /// Archive a tracked product; pending jobs for it are cancelled at claim time.
    Archive { tracked_product_id: String },
    /// Delivery health since some hours ago.
    Status {
        #[arg(long, default_value_t = 24)]
        since_hours: i64,
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
}

fn load_config(path: Option<&PathBuf>) -> PulseConfig {
    let loaded = match path {
        Some(path) => pricepulse_config::load_and_validate_path(path),
        None => pricepulse_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            pricepulse_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let Some(command) = cli.command else {
        println!("pricepulse: use --help for available commands");
        return;
    };

    let result = match command {
        Commands::Serve => serve::run_serve(config).await,
        Commands::Evaluate { at } => ops::run_evaluate(&config, at).await,
        Commands::Dispatch { job_id } => ops::run_dispatch(&config, job_id).await,
        Commands::Requeue { job_id } => ops::run_requeue(&config, &job_id).await,
        Commands::Abandon { job_id } => ops::run_abandon(&config, &job_id).await,
        Commands::Archive { tracked_product_id } => {
            ops::run_archive(&config, &tracked_product_id).await
        }
        Commands::Status { since_hours, json } => {
            status::run_status(&config, since_hours, json).await
        }
        Commands::Config {
            action: ConfigAction::Show,
        } => ops::show_config(&config),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
