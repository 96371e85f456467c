//! CyberCare Snort connector
//!
//! Tails a Snort alert log, spools every alert into a local SQLite
//! database, and submits them to the CyberCare analysis API with bounded
//! retry. Also ships a threat simulator for exercising the API without a
//! live sensor.

mod alert;
mod client;
mod mapping;
mod record;
mod runner;
mod simulator;
mod spool;
mod tail;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::client::{ApiClient, ApiConfig};
use crate::runner::{RunOptions, Runner};
use crate::simulator::SimulateOptions;
use crate::spool::Spool;

#[derive(Parser)]
#[command(name = "cybercare-connector", version, about = "Snort to CyberCare threat connector")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Tail the Snort alert log and submit threats to the API
    Run {
        /// Path to the Snort alert log
        #[arg(long, default_value = "/var/log/snort/alert")]
        log_path: PathBuf,

        /// Analyze endpoint URL
        #[arg(long, default_value = "http://localhost:8000/api/v1/threats/analyze")]
        api_url: String,

        /// Poll interval in seconds (backstop for missed file events)
        #[arg(long, default_value_t = 10)]
        poll_interval: u64,

        /// Submit alerts in batches instead of one at a time
        #[arg(long)]
        batch: bool,

        /// Alerts per batch submission
        #[arg(long, default_value_t = 10)]
        batch_size: usize,

        /// Path to the local spool database
        #[arg(long, env = "SNORT_DB_PATH", default_value = "snort_threats.db")]
        db_path: PathBuf,

        /// Seconds between retry sweeps over pending alerts
        #[arg(long, env = "RETRY_INTERVAL", default_value_t = 60)]
        retry_interval: u64,

        /// Failed attempts before an alert stops being retried
        #[arg(long, env = "RETRY_LIMIT", default_value_t = 3)]
        retry_limit: u32,

        /// Process the backlog, drain pending alerts, then exit
        #[arg(long)]
        once: bool,
    },

    /// Print spool statistics
    Stats {
        /// Path to the local spool database
        #[arg(long, env = "SNORT_DB_PATH", default_value = "snort_threats.db")]
        db_path: PathBuf,
    },

    /// Delete spooled threats older than a cutoff
    Cleanup {
        /// Path to the local spool database
        #[arg(long, env = "SNORT_DB_PATH", default_value = "snort_threats.db")]
        db_path: PathBuf,

        /// Age cutoff in days
        #[arg(long, default_value_t = 30)]
        days: u32,
    },

    /// Generate synthetic threats and submit them to the API
    Simulate {
        /// Analyze endpoint URL
        #[arg(long, default_value = "http://localhost:8000/api/v1/threats/analyze")]
        api_url: String,

        /// Number of threats to generate
        #[arg(long, default_value_t = 10)]
        count: u32,

        /// Minimum seconds between submissions
        #[arg(long, default_value_t = 5)]
        interval_min: u64,

        /// Maximum seconds between submissions
        #[arg(long, default_value_t = 15)]
        interval_max: u64,

        /// Submit threats in batches
        #[arg(long)]
        batch: bool,

        /// Threats per batch submission
        #[arg(long, default_value_t = 5)]
        batch_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            log_path,
            api_url,
            poll_interval,
            batch,
            batch_size,
            db_path,
            retry_interval,
            retry_limit,
            once,
        } => {
            let spool = Spool::open(&db_path)
                .with_context(|| format!("failed to open spool at {:?}", db_path))?;
            let client = ApiClient::new(ApiConfig::new(api_url))?;
            let options = RunOptions {
                log_path,
                poll_interval,
                batch,
                batch_size,
                retry_interval,
                retry_limit,
                once,
            };
            Runner::new(options, spool, client).run().await
        }

        Command::Stats { db_path } => {
            let spool = Spool::open(&db_path)
                .with_context(|| format!("failed to open spool at {:?}", db_path))?;
            let stats = spool.stats()?;

            println!("Spool: {:?}", stats.db_path);
            println!("  Total threats:     {}", stats.total_threats);
            println!("  Submitted:         {}", stats.submitted_threats);
            println!("  Pending:           {}", stats.pending_threats);
            println!("  Attempts (24h):    {} ok, {} failed",
                stats.attempts_24h_success, stats.attempts_24h_failure);
            if !stats.behavior_counts.is_empty() {
                println!("  By behavior:");
                for (behavior, count) in &stats.behavior_counts {
                    println!("    {:20} {}", behavior, count);
                }
            }
            Ok(())
        }

        Command::Cleanup { db_path, days } => {
            let spool = Spool::open(&db_path)
                .with_context(|| format!("failed to open spool at {:?}", db_path))?;
            let removed = spool.cleanup_older_than(days)?;
            println!("Removed {} threats older than {} days", removed, days);
            Ok(())
        }

        Command::Simulate {
            api_url,
            count,
            interval_min,
            interval_max,
            batch,
            batch_size,
        } => {
            let client = ApiClient::new(ApiConfig::new(api_url))?;
            let options = SimulateOptions {
                count,
                interval_min,
                interval_max,
                batch,
                batch_size,
            };
            simulator::run(options, client).await
        }
    }
}
