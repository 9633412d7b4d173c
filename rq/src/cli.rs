//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_PROVIDER;

/// rq - rate-limited task scheduler
#[derive(Parser)]
#[command(
    name = "rq",
    about = "Rate-limited, retrying task scheduler for throttled providers",
    version,
    after_help = "Logs are written to: ~/.local/share/ratequeue/logs/rq.log (override with RQ_LOG_DIR)"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Run simulated provider calls through a scheduler
    Simulate {
        /// Provider whose scheduler config to use
        #[arg(short, long, default_value = DEFAULT_PROVIDER)]
        provider: String,

        /// Number of tasks to submit
        #[arg(short = 'n', long, default_value = "10")]
        tasks: usize,

        /// Throttle every k-th task on its first call (0 = never)
        #[arg(short = 'k', long, default_value = "3")]
        throttle_every: usize,

        /// Simulated time per call in milliseconds
        #[arg(short, long, default_value = "200")]
        work_ms: u64,

        /// Override the minimum delay between dispatches
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Override the concurrency limit
        #[arg(long)]
        max_concurrent: Option<usize>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the effective configuration
    Config,
}

/// Output format for simulation results
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown format: {}. Use: text or json", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("PLAIN".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_simulate_args() {
        let cli = Cli::try_parse_from(["rq", "simulate", "-n", "4", "--delay-ms", "5", "--format", "json"]).unwrap();
        match cli.command {
            Some(Command::Simulate {
                provider,
                tasks,
                delay_ms,
                format,
                ..
            }) => {
                assert_eq!(provider, "storage");
                assert_eq!(tasks, 4);
                assert_eq!(delay_ms, Some(5));
                assert_eq!(format, OutputFormat::Json);
            }
            _ => panic!("expected simulate"),
        }
    }
}
