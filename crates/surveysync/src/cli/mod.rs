//! Command-line interface for surveysync.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{
    ConfigCommand, LanguageArg, ListCommand, OutputFormat, RemoveCommand, StatusCommand,
    SubmitCommand, SyncCommand,
};

use crate::logging::Verbosity;

/// surveysync - Offline-first survey submission
///
/// Submits survey responses to the collection endpoint, keeping them in a
/// local queue while the device is offline and syncing them once it
/// reconnects.
#[derive(Debug, Parser)]
#[command(name = "surveysync")]
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
    /// Submit a survey, saving it locally if it cannot be delivered
    Submit(SubmitCommand),

    /// Run one sync pass over the pending queue
    Sync(SyncCommand),

    /// Watch connectivity and sync automatically until interrupted
    Watch,

    /// Show connectivity and pending-queue status
    Status(StatusCommand),

    /// List pending surveys, oldest first
    List(ListCommand),

    /// Discard a pending survey
    Remove(RemoveCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.verbose, self.quiet)
    }
}
