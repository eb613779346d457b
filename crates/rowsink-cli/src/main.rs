//! Rowsink CLI - buffered write sink for distributed key-value stores.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rowsink_core::config::LogFormat;
use rowsink_core::Config;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit codes for CLI operations.
///
/// Following Unix conventions:
/// - 0: Success
/// - 1-127: Application errors
/// - 128+N: Signal N received (e.g., 130 = SIGINT)
#[repr(i32)]
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    /// Successful execution
    Success = 0,
    /// Configuration error (invalid config file, missing required fields)
    ConfigError = 1,
    /// Store or flush-path error
    StoreError = 2,
    /// General runtime error
    RuntimeError = 10,
}

impl ExitCode {
    /// Convert an error to an exit code by inspecting the error message.
    fn from_error(error: &anyhow::Error) -> Self {
        let error_str = error.to_string().to_lowercase();

        if error_str.contains("config") || error_str.contains("toml") {
            ExitCode::ConfigError
        } else if error_str.contains("store") || error_str.contains("flush") {
            ExitCode::StoreError
        } else {
            ExitCode::RuntimeError
        }
    }
}

mod commands;
mod server;

#[derive(Parser)]
#[command(name = "rowsink")]
#[command(about = "Buffered write sink CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (-v for debug, -vv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a synthetic workload against the buffer until interrupted
    Run {
        /// Producer tasks to spawn
        #[arg(long, default_value_t = 8)]
        producers: usize,

        /// Target rows per second across all producers
        #[arg(long, default_value_t = 10_000)]
        rate: u64,

        /// Number of target tables
        #[arg(long, default_value_t = 3)]
        tables: usize,
    },

    /// Measure throughput for a fixed workload, then drain and verify
    Bench {
        /// Producer tasks to spawn
        #[arg(long, default_value_t = 100)]
        workers: usize,

        /// Puts issued by each producer
        #[arg(long, default_value_t = 500)]
        puts: usize,

        /// Number of target tables (producers round-robin)
        #[arg(long, default_value_t = 1)]
        tables: usize,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a configuration file
    Check,
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Ok(Config::from_file(path)?),
        None => Ok(Config::default()),
    }
}

fn init_tracing(config: &Config, verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rowsink={0},rowsink_core={0}", default_level)));

    match config.monitoring.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("Configuration error: {error:#}");
            std::process::exit(ExitCode::ConfigError as i32);
        }
    };

    init_tracing(&config, cli.verbose);

    let result = match cli.command {
        Commands::Run {
            producers,
            rate,
            tables,
        } => commands::run::execute(config, producers, rate, tables).await,
        Commands::Bench {
            workers,
            puts,
            tables,
            json,
        } => commands::bench::execute(config, workers, puts, tables, json).await,
        Commands::Check => commands::check::execute(&cli.config),
    };

    match result {
        Ok(()) => std::process::exit(ExitCode::Success as i32),
        Err(error) => {
            eprintln!("Error: {error:#}");
            std::process::exit(ExitCode::from_error(&error) as i32);
        }
    }
}
