//! rq - rate-limited task scheduler
//!
//! CLI entry point for exercising a scheduler and inspecting configuration.

use std::fs;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::info;

use ratequeue::cli::{Cli, Command, OutputFormat};
use ratequeue::config::{Config, LogConfig};
use ratequeue::scheduler::Scheduler;
use ratequeue::simulate::{self, SimulationOptions, SimulationReport, TaskStatus};

fn setup_logging(verbose: bool, log: &LogConfig) -> Result<()> {
    let log_dir = log.log_dir();
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Setup tracing subscriber - write to log file, not stdout/stderr
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        log.level.parse().unwrap_or(tracing::Level::INFO)
    };
    let log_file = fs::File::create(log_dir.join("rq.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (verbose: {})", verbose);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging
    setup_logging(cli.verbose, &config.log).context("Failed to setup logging")?;

    info!(providers = config.providers.len(), "rq loaded config");

    match cli.command {
        Some(Command::Simulate {
            provider,
            tasks,
            throttle_every,
            work_ms,
            delay_ms,
            max_concurrent,
            format,
        }) => {
            let options = SimulationOptions {
                tasks,
                throttle_every,
                work: Duration::from_millis(work_ms),
                jitter: true,
            };
            cmd_simulate(&config, &provider, delay_ms, max_concurrent, &options, format).await
        }
        Some(Command::Config) => cmd_config(&config),
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

/// Run simulated calls through the named provider's scheduler
async fn cmd_simulate(
    config: &Config,
    provider: &str,
    delay_ms: Option<u64>,
    max_concurrent: Option<usize>,
    options: &SimulationOptions,
    format: OutputFormat,
) -> Result<()> {
    let mut scheduler_config = config.scheduler(provider);
    if let Some(delay_ms) = delay_ms {
        scheduler_config.min_dispatch_delay_ms = delay_ms;
    }
    if let Some(max_concurrent) = max_concurrent {
        scheduler_config.max_concurrent = max_concurrent;
    }

    info!(%provider, ?scheduler_config, ?options, "Starting simulation");
    let scheduler = Scheduler::spawn(scheduler_config).context("Failed to start scheduler")?;
    let report = simulate::run(&scheduler, options)
        .await
        .context("Simulation failed")?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(provider, &report),
    }
    Ok(())
}

fn print_report(provider: &str, report: &SimulationReport) {
    println!("{} {}", "Provider:".bold(), provider);
    for task in &report.tasks {
        let status = match task.status {
            TaskStatus::Ok => task.status.to_string().green(),
            TaskStatus::Exhausted => task.status.to_string().yellow(),
            _ => task.status.to_string().red(),
        };
        print!(
            "  task {:>3}  {:<10} attempts={}  {}ms",
            task.index, status, task.attempts, task.elapsed_ms
        );
        match &task.error {
            Some(error) => println!("  {}", error.dimmed()),
            None => println!(),
        }
    }

    let stats = &report.stats;
    println!();
    println!("{}", "Stats:".bold());
    println!("  submitted:       {}", stats.total_submitted);
    println!("  succeeded:       {}", stats.total_succeeded);
    println!("  failed:          {}", stats.total_failed);
    println!("  exhausted:       {}", stats.total_exhausted);
    println!("  cancelled:       {}", stats.total_cancelled);
    println!("  retries:         {}", stats.total_retries);
    println!("  peak queue:      {}", stats.peak_queue_depth);
    println!("  peak concurrent: {}", stats.peak_concurrent);
    println!("  elapsed:         {}ms", report.elapsed_ms);
}

/// Print the effective configuration as YAML
fn cmd_config(config: &Config) -> Result<()> {
    let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}
