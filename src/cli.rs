// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `gomander`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "gomander",
    version,
    about = "Run the commands of a gomander project and stream their output.",
    long_about = None
)]
pub struct CliArgs {
    /// Directory holding `config.toml` and `projects/`.
    ///
    /// Default: `GOMANDER_HOME`, else `~/.gomander`.
    #[arg(long, value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `GOMANDER_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// List projects, or the commands and groups of one project.
    List {
        /// Project id or name.
        #[arg(long, value_name = "PROJECT")]
        project: Option<String>,
    },

    /// Run commands and groups, printing their output until they finish.
    ///
    /// Ctrl-C stops everything that was started.
    Run {
        /// Project id or name. Defaults to the last opened project.
        #[arg(long, value_name = "PROJECT")]
        project: Option<String>,

        /// Command or group ids or names.
        #[arg(value_name = "TARGET", required = true)]
        targets: Vec<String>,
    },
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
