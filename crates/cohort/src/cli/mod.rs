//! Command-line interface for cohort.
//!
//! This module provides the CLI structure for the `cohortctl` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, DiagnoseCommand, OutputFormat, ParticipantCommand, ServeCommand, StatusArg,
    StatusCommand,
};

use crate::logging::Verbosity;

/// cohortctl - Run and manage the cohort participant registry
///
/// Serves the registry API, manages participants through it (falling back to
/// an offline copy when it is unreachable), and checks endpoint health.
#[derive(Debug, Parser)]
#[command(name = "cohortctl")]
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
    /// Run the REST API server
    Serve(ServeCommand),

    /// Manage participants
    #[command(subcommand)]
    Participant(ParticipantCommand),

    /// Push changes made while offline
    Sync,

    /// Probe the API endpoints one by one
    Diagnose(DiagnoseCommand),

    /// Show API and offline store status
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}
