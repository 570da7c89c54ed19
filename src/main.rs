//! Binary entry point for RLG-RS.
//!
//! Retrieval-Locked Generation: grounded question answering over local
//! documents.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use clap::Parser;
use rlg_rs::cli::commands::format_error;
use rlg_rs::cli::{Cli, OutputFormat, execute};
use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    // Load .env before settings are read from the environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let format = OutputFormat::parse(&cli.format);

    init_tracing(cli.verbose);

    match execute(&cli) {
        Ok(output) => {
            if !output.is_empty() {
                // Handle broken pipe gracefully (e.g., when piped to `head`)
                if let Err(e) = write!(io::stdout(), "{output}") {
                    if e.kind() != io::ErrorKind::BrokenPipe {
                        eprintln!("Error writing to stdout: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let error_output = format_error(&e, format);
            match format {
                OutputFormat::Json => {
                    // JSON errors go to stdout for programmatic parsing
                    println!("{error_output}");
                }
                OutputFormat::Text => {
                    eprintln!("Error: {error_output}");
                }
            }
            ExitCode::FAILURE
        }
    }
}

/// Initializes the tracing subscriber. `RUST_LOG` takes precedence;
/// `--verbose` lowers the default to debug.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
