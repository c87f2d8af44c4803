//! tq - run shell jobs through the taskqueue scheduler
//!
//! CLI entry point.

use std::fs;
use std::process::ExitCode;

use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use taskqueue::cli::{Cli, Command, OutputFormat, get_log_path};
use taskqueue::config::Config;
use taskqueue::jobs::{JobFile, JobReport, run_jobs};
use taskqueue::scheduler::{Scheduler, SchedulerStats};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    if let Some(log_dir) = log_path.parent() {
        fs::create_dir_all(log_dir).context("Failed to create log directory")?;
    }

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run {
            file,
            concurrency,
            format,
        } => {
            let mut scheduler_config = config.scheduler.clone();
            if let Some(concurrency) = concurrency {
                scheduler_config.concurrency = concurrency;
            }
            let jobs = JobFile::load(&file)?;
            cmd_run(scheduler_config, &jobs, format, cli.verbose).await
        }
        Command::Config => {
            print!("{}", config.to_yaml()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn cmd_run(
    config: taskqueue::SchedulerConfig,
    jobs: &JobFile,
    format: OutputFormat,
    verbose: bool,
) -> Result<ExitCode> {
    let scheduler = Scheduler::spawn(config).context("Failed to start scheduler")?;

    scheduler.subscribe_error(move |err, task| {
        warn!(task = %task.id, attempts = task.attempts, error = %err, "Job attempt failed");
        if verbose {
            eprintln!("{} {} attempt {}: {}", "!".yellow(), task.id, task.attempts + 1, err);
        }
    });

    let reports = run_jobs(&scheduler, jobs).await;
    let stats = scheduler.snapshot_stats().await?;
    scheduler.shutdown().await?;

    match format {
        OutputFormat::Text => print_text(&reports, &stats),
        OutputFormat::Json => {
            let out = serde_json::json!({ "jobs": reports, "stats": stats });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    if reports.iter().all(|r| r.success) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn print_text(reports: &[JobReport], stats: &SchedulerStats) {
    for report in reports {
        if report.success {
            println!("{} {}", "✓".green(), report.name.cyan());
            if let Some(stdout) = report.stdout.as_deref().filter(|s| !s.is_empty()) {
                for line in stdout.lines() {
                    println!("    {}", line.dimmed());
                }
            }
        } else {
            println!(
                "{} {} ({} attempts): {}",
                "✗".red(),
                report.name.cyan(),
                report.executions,
                report.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    println!(
        "{} total, {} succeeded, {} failed",
        stats.total,
        stats.succeeded.to_string().green(),
        stats.failed.to_string().red()
    );
}
