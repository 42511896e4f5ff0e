//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::session::Language;

/// Submit command arguments.
#[derive(Debug, Args)]
pub struct SubmitCommand {
    /// JSON file with the form's answers (an object of field names to values)
    pub file: PathBuf,

    /// Respondent language
    #[arg(short, long, value_enum, default_value = "en")]
    pub language: LanguageArg,

    /// JSON file with important-place markers
    #[arg(long, value_name = "FILE")]
    pub places: Option<PathBuf>,

    /// JSON file with important-place drawings
    #[arg(long, value_name = "FILE")]
    pub drawings: Option<PathBuf>,

    /// JSON file with wildlife encounter markers
    #[arg(long, value_name = "FILE")]
    pub encounters: Option<PathBuf>,

    /// Fields that must be answered, comma-separated (e.g. consent1,consent2)
    #[arg(long, value_name = "FIELDS", value_delimiter = ',')]
    pub require: Vec<String>,

    /// Require the four consent questions
    #[arg(long)]
    pub require_consent: bool,
}

/// Sync command arguments.
#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Output the pass report as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// List command arguments.
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Output format
    #[arg(short, long, value_enum, default_value = "plain")]
    pub format: OutputFormat,
}

/// Remove command arguments.
#[derive(Debug, Args)]
pub struct RemoveCommand {
    /// Local id of the pending survey
    pub id: i64,
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

/// Survey language argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LanguageArg {
    /// English
    En,
    /// Polish
    Pl,
}

impl From<LanguageArg> for Language {
    fn from(arg: LanguageArg) -> Self {
        match arg {
            LanguageArg::En => Self::En,
            LanguageArg::Pl => Self::Pl,
        }
    }
}

/// Output format for list results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One line per survey
    Plain,
    /// JSON array
    Json,
}
