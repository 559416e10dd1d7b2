//! CLI tool for running the lifecycle sweep
//!
//! Expires lapsed module subscriptions and trials, and lifts elapsed
//! temporary suspensions. Meant to be invoked by cron when the in-process
//! scheduler is disabled (`trial.sweep_interval_secs: 0`).
//!
//! Usage:
//!   run-lifecycle-sweep [--config <path>] [--dry-run] [--verbose]
//!
//! Example cron entry (run hourly):
//!   0 * * * * /usr/local/bin/run-lifecycle-sweep --config /etc/medsas/config.yaml

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use medsas::{
    db,
    services::{build_mailer, EmailService, LifecycleSweeper},
    AppConfig,
};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut dry_run = false;
    let mut verbose = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--dry-run" => {
                dry_run = true;
            }
            "--verbose" | "-v" => {
                verbose = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("MedSAS - Lifecycle Sweep");

    let config = match config_path {
        Some(ref path) => {
            info!("Config file: {}", path.display());
            AppConfig::load_from(Some(path))?
        }
        None => {
            info!("Using default configuration paths");
            AppConfig::load()?
        }
    };

    let pool = db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;
    info!("Connected to database: {}", config.database.url);

    let email = if dry_run {
        None
    } else {
        let mailer = build_mailer(&config.email)?;
        Some(EmailService::new(mailer, config.email.app_base_url.clone()))
    };

    let sweeper = LifecycleSweeper::new(pool, config.trial.appeal_window_days, email);
    let summary = sweeper.run_once(Utc::now(), dry_run).await?;

    let verb = if dry_run { "Would" } else { "Did" };
    println!("{} expire {} module subscription(s)", verb, summary.modules_expired);
    println!("{} expire {} trial(s)", verb, summary.trials_expired);
    if !dry_run {
        println!(
            "Suspended {} tenant(s), cascaded {} user(s)",
            summary.tenants_suspended, summary.users_cascaded
        );
    }
    println!("{} lift {} suspension(s)", verb, summary.suspensions_lifted);

    Ok(())
}

fn print_help() {
    println!(
        r#"MedSAS Lifecycle Sweep

USAGE:
    run-lifecycle-sweep [OPTIONS]

OPTIONS:
    --config <path>     Path to configuration file
    --dry-run           Count what would change without writing
    -v, --verbose       Enable verbose output
    -h, --help          Print this help message"#
    );
}
