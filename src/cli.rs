// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `filejobrouter`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "filejobrouter",
    version,
    about = "Route newly arriving files to worker executables.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (JSON).
    ///
    /// Default: the `config.json` discovered in the nearest ancestor
    /// directory of the running executable.
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `FILEJOBROUTER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the watch directory and mappings, but
    /// don't watch or execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
