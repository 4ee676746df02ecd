//! Command-line surface.

use clap::{Parser, Subcommand};

use relay_core::variant::{ExecutionMode, VariantSelection};

#[derive(Debug, Parser)]
#[command(author, version, about = "Generation relay worker", long_about = None)]
pub struct Cli {
    /// API key the commands run as
    #[arg(long, env = "RELAY_API_KEY", global = true, default_value = "")]
    pub api_key: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start a generation and follow it to completion
    Generate {
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },

    /// Show a generation task
    Status { task_id: String },

    /// List generation tasks visible to the caller
    Tasks,

    /// Upscale one variant of a finished generation
    Upscale {
        /// Task id or backend message id of the grid
        #[arg(long)]
        task: String,

        #[arg(long)]
        index: u8,
    },

    /// Generate a grid and upscale the selected variants
    Full {
        #[arg(long, default_value = "all")]
        variants: VariantSelection,

        #[arg(long, default_value = "sequential")]
        mode: ExecutionMode,

        /// Block until the run finishes
        #[arg(long, default_value_t = false)]
        wait: bool,

        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },

    /// Show a full generation record
    Show { id: String },

    /// List the caller's full generations, newest first
    List {
        #[arg(long)]
        limit: Option<i64>,
    },

    /// Read commands from stdin, one per line, sharing one task registry
    Shell,
}

/// A single line typed into the shell.
#[derive(Debug, Parser)]
#[command(no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: Command,
}

impl ShellLine {
    pub fn parse_line(line: &str) -> Result<Command, clap::Error> {
        Self::try_parse_from(line.split_whitespace()).map(|l| l.command)
    }
}

/// Join prompt words back into one string.
pub fn join_prompt(words: &[String]) -> String {
    words.join(" ")
}
