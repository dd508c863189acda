//! Command-line interface for framefeed.
//!
//! This module provides the CLI structure for the `framefeed` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, HealthCommand, OutputFormat, SnapshotCommand, WatchCommand};

/// framefeed - Live camera feed over a snapshot endpoint
///
/// Polls the robot's camera snapshot endpoint and keeps the latest frame
/// current, dropping polls while a request is still outstanding.
#[derive(Debug, Parser)]
#[command(name = "framefeed")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Follow the live feed until interrupted
    Watch(WatchCommand),

    /// Fetch a single frame
    Snapshot(SnapshotCommand),

    /// Check that the camera service is up
    Health(HealthCommand),

    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
