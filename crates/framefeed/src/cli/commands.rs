//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

/// Watch command arguments.
#[derive(Debug, Args)]
pub struct WatchCommand {
    /// Stop after this many seconds (default: run until Ctrl-C)
    #[arg(short, long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Keep the current frame written to this file
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Format of the summary printed on exit
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Snapshot command arguments.
#[derive(Debug, Args)]
pub struct SnapshotCommand {
    /// Where to write the frame
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,
}

/// Health command arguments.
#[derive(Debug, Args)]
pub struct HealthCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration (the token is masked)
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// JSON output
    Json,
}
