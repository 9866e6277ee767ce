//! Service manager access for the bridge service

use crate::error::{Error, Result};
use std::process::{Command, Stdio};

/// Enables and restarts host services
pub trait ServiceManager {
    /// Enable `unit` at boot and restart it now
    fn enable_and_restart(&self, unit: &str) -> Result<()>;
}

/// systemd via `systemctl`
#[derive(Debug, Default, Clone, Copy)]
pub struct Systemctl;

impl Systemctl {
    fn run(action: &str, unit: &str) -> Result<()> {
        let command = format!("systemctl {} {}", action, unit);

        // Inherit stdio so the operator sees systemd's own messages
        let status = Command::new("systemctl")
            .args([action, unit])
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| Error::CommandFailed {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::CommandFailed {
                command,
                message: format!("exited with {}", status),
            })
        }
    }
}

impl ServiceManager for Systemctl {
    fn enable_and_restart(&self, unit: &str) -> Result<()> {
        Self::run("enable", unit)?;
        Self::run("restart", unit)
    }
}
