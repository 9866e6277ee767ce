//! LXC backend using the `lxc-*` command line tools
//!
//! Containers are the directories under the backend root that carry an LXC
//! `config` file. Starts run as the container service account through
//! `sudo` so unprivileged containers come back under their owner.

use crate::container::{ContainerBackend, ContainerState};
use crate::error::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// LXC containers under one root path
#[derive(Debug, Clone)]
pub struct LxcTools {
    /// Backend root passed to every tool as `-P`
    root: PathBuf,
    /// Account used for `lxc-start`
    user: String,
}

impl LxcTools {
    pub fn new(root: impl Into<PathBuf>, user: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            user: user.into(),
        }
    }

    /// Base `lxc-*` invocation scoped to the root and a container
    fn lxc(&self, tool: &str, name: &str) -> Command {
        let mut cmd = Command::new(tool);
        cmd.arg("-P").arg(&self.root).arg("-n").arg(name);
        cmd
    }

    fn describe(cmd: &Command) -> String {
        let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
        parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }

    fn run(mut cmd: Command) -> Result<()> {
        let command = Self::describe(&cmd);
        let status = cmd.status().map_err(|e| Error::CommandFailed {
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

impl ContainerBackend for LxcTools {
    fn root(&self) -> &Path {
        &self.root
    }

    fn list(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            // No root yet means nothing is registered
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::Io(e)),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.path().join("config").is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(name);
            }
        }
        names.sort();

        Ok(names)
    }

    fn state(&self, name: &str) -> Result<ContainerState> {
        let mut cmd = self.lxc("lxc-info", name);
        cmd.args(["-s", "-H"]);
        let command = Self::describe(&cmd);

        let output = cmd.output().map_err(|e| Error::CommandFailed {
            command: command.clone(),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                command,
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(ContainerState::parse(&String::from_utf8_lossy(&output.stdout)))
    }

    fn stop(&self, name: &str) -> Result<()> {
        Self::run(self.lxc("lxc-stop", name))
    }

    fn start(&self, name: &str) -> Result<()> {
        let mut cmd = Command::new("sudo");
        cmd.args(["-u", self.user.as_str(), "--", "lxc-start", "-P"])
            .arg(&self.root)
            .args(["-n", name])
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        Self::run(cmd)
    }
}
