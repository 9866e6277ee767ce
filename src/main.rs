//! ocsdk-target - LXC build target host setup
//!
//! Prepares a host for unprivileged build containers: allocates a free
//! bridge subnet, edits the LXC bridge config, sets up ID mappings and
//! restarts exactly the containers it had to stop.

mod cli;
mod container;
mod error;
mod lifecycle;
mod manifest;
mod network;
mod provision;
mod setup;
mod sys;

use cli::{Cli, Commands};
use error::Result;
use network::BridgeOutcome;
use std::io;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Completion { shell } => {
            Cli::generate_completion(shell);
        }

        Commands::List => {
            let config = manifest::load_or_default(cli.config.as_deref())?;
            let backend = container::LxcTools::new(
                &config.config.target_path,
                &config.config.container_user,
            );
            let summaries = container::summarize(&backend)?;
            let json = serde_json::to_string_pretty(&summaries).map_err(io::Error::from)?;
            println!("{}", json);
        }

        Commands::Autosetup { yes, no_bridge } => {
            let config = manifest::load_or_default(cli.config.as_deref())?;
            let opts = setup::AutosetupOptions {
                yes,
                no_bridge,
                verbose: cli.verbose,
            };

            let report = setup::autosetup(&config, &opts)?;

            println!("\nSetup complete.");
            match &report.bridge {
                BridgeOutcome::Configured { subnet } => println!("  Bridge subnet: {}", subnet),
                BridgeOutcome::AlreadyConfigured => println!("  Bridge: already configured"),
                BridgeOutcome::Skipped => println!("  Bridge: skipped"),
            }
            println!("  Containers restarted: {}", report.stopped.len() - report.restart_failures.len());
            if !report.restart_failures.is_empty() {
                println!(
                    "  {} container(s) failed to start, see messages above",
                    report.restart_failures.len()
                );
            }
        }
    }

    Ok(())
}
