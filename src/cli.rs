//! Command-line interface for ocsdk-target
//!
//! Uses clap with derive for type-safe CLI parsing

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// ocsdk-target - LXC build target host setup
#[derive(Parser)]
#[command(name = "ocsdk-target")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path (default: /etc/ocsdk-target.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Reconfigure the host: bridge, ID mappings, usernet and directories
    Autosetup {
        /// Do not ask for confirmation
        #[arg(short = 'y', long)]
        yes: bool,

        /// Leave the LXC bridge configuration untouched
        #[arg(short = 'b', long)]
        no_bridge: bool,
    },

    /// List containers and their state as JSON
    List,

    /// Generate shell completions
    Completion {
        /// Shell to generate completion for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Generate shell completion scripts
    pub fn generate_completion(shell: Shell) {
        let mut cmd = Self::command();
        clap_complete::generate(shell, &mut cmd, "ocsdk-target", &mut std::io::stdout());
    }
}
