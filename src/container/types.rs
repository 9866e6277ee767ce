//! Container state and the set of containers stopped during a run

use serde::Serialize;
use std::fmt;

/// Observed container state, as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Aborting,
    Freezing,
    Frozen,
    Thawed,
    Unknown,
}

impl ContainerState {
    /// Parse the state name printed by `lxc-info -s`
    ///
    /// Accepts both `RUNNING` and `State: RUNNING`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        let s = s.strip_prefix("State:").unwrap_or(s).trim();
        match s.to_ascii_uppercase().as_str() {
            "STOPPED" => ContainerState::Stopped,
            "STARTING" => ContainerState::Starting,
            "RUNNING" => ContainerState::Running,
            "STOPPING" => ContainerState::Stopping,
            "ABORTING" => ContainerState::Aborting,
            "FREEZING" => ContainerState::Freezing,
            "FROZEN" => ContainerState::Frozen,
            "THAWED" => ContainerState::Thawed,
            _ => ContainerState::Unknown,
        }
    }

    /// Anything but `Stopped` needs a stop before the network is touched
    pub fn is_stopped(&self) -> bool {
        *self == ContainerState::Stopped
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerState::Stopped => "stopped",
            ContainerState::Starting => "starting",
            ContainerState::Running => "running",
            ContainerState::Stopping => "stopping",
            ContainerState::Aborting => "aborting",
            ContainerState::Freezing => "freezing",
            ContainerState::Frozen => "frozen",
            ContainerState::Thawed => "thawed",
            ContainerState::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// A registered container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    /// Unique name under the backend root
    pub name: String,
    /// State observed when the run scanned it
    pub state: ContainerState,
}

/// Containers this run stopped, in the order they were stopped
///
/// Only grows while stopping; the restart phase reads it front to back.
#[derive(Debug, Default)]
pub struct StoppedSet {
    containers: Vec<Container>,
}

impl StoppedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a container that was observed running and has been stopped
    pub fn push(&mut self, container: Container) {
        self.containers.push(container);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Container> {
        self.containers.iter()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Names in stop order
    pub fn names(&self) -> Vec<String> {
        self.containers.iter().map(|c| c.name.clone()).collect()
    }
}
