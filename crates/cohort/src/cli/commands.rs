//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::model::ParticipantStatus;
use crate::storage::DEFAULT_LIMIT;

/// Serve command arguments.
#[derive(Debug, Args)]
pub struct ServeCommand {
    /// Address to bind (overrides `server.host`)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (overrides `server.port`)
    #[arg(short, long)]
    pub port: Option<u16>,
}

/// Participant commands, run against the API with offline fallback.
#[derive(Debug, Subcommand)]
pub enum ParticipantCommand {
    /// List participants
    List {
        /// Match against names and email
        #[arg(short, long)]
        search: Option<String>,

        /// Only participants in this state
        #[arg(long, value_enum)]
        status: Option<StatusArg>,

        /// Maximum number of results
        #[arg(short, long, default_value_t = DEFAULT_LIMIT)]
        limit: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },

    /// Show one participant
    Show {
        /// Participant id
        id: String,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Register a participant
    Add {
        /// Given name
        #[arg(long)]
        first_name: String,

        /// Family name
        #[arg(long)]
        last_name: String,

        /// Contact email, unique across participants
        #[arg(long)]
        email: String,

        /// Contact phone
        #[arg(long)]
        phone: Option<String>,

        /// Employer
        #[arg(long)]
        company: Option<String>,
    },

    /// Remove a participant
    Remove {
        /// Participant id
        id: String,
    },

    /// Write every participant to a JSON file
    Export {
        /// Destination file
        file: PathBuf,
    },

    /// Store every participant from a JSON file, replacing existing ones
    Import {
        /// Source file, as written by `export`
        file: PathBuf,
    },
}

/// Diagnose command arguments.
#[derive(Debug, Args)]
pub struct DiagnoseCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,

    /// API base URL to probe (overrides `client.api_url`)
    #[arg(long)]
    pub url: Option<String>,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
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

/// Participant status argument for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    /// Currently enrolled
    Active,
    /// Paused or withdrawn
    Inactive,
    /// Finished the program
    Completed,
}

impl From<StatusArg> for ParticipantStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Active => Self::Active,
            StatusArg::Inactive => Self::Inactive,
            StatusArg::Completed => Self::Completed,
        }
    }
}

/// Output format for commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    #[default]
    Plain,
    /// Formatted table
    Table,
    /// JSON output
    Json,
}
