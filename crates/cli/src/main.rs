//! Rolecheck CLI - Main Entry Point
//!
//! Runs role-based scenario suites against the host application, or against
//! the built-in simulated portal with `--simulate`.
//!
//! Exit codes: 0 when every instance passed, 1 when any instance failed,
//! 2 when the run could not start (configuration, dataset, WebDriver).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod output;

use commands::{run, validate};

/// Rolecheck - login/navigate/verify/logout checks per account
#[derive(Parser)]
#[command(name = "rolecheck")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file
    #[arg(
        short,
        long,
        default_value = "rolecheck.toml",
        env = "ROLECHECK_CONFIG",
        global = true
    )]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Log line format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run scenarios for every account in the dataset
    Run(run::RunArgs),

    /// Check configuration, dataset and scenario files without a browser
    Validate(validate::ValidateArgs),

    /// Show version information
    Version,
}

fn init_logging(verbose: bool, format: LogFormat) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .init(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let outcome = match cli.command {
        Commands::Run(args) => run::execute(args, &cli.config, cli.format).await,
        Commands::Validate(args) => validate::execute(args, &cli.config, cli.format),
        Commands::Version => {
            println!("rolecheck v{}", env!("CARGO_PKG_VERSION"));
            Ok(run::EXIT_OK)
        }
    };

    let code = match outcome {
        Ok(code) => code,
        Err(e) => {
            output::print_error(&format!("{e:#}"));
            run::EXIT_FATAL
        }
    };
    std::process::exit(code);
}
