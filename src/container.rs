//! Container backend access
//!
//! This module provides:
//! - The backend trait the lifecycle coordinator drives
//! - An LXC implementation built on the `lxc-*` tools
//! - Container state and the stopped set captured during a run

pub mod lxc;
pub mod types;

use crate::error::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};

// Re-exports
pub use lxc::LxcTools;
pub use types::{Container, ContainerState, StoppedSet};

/// Operations on the containers registered under one backend root
pub trait ContainerBackend {
    /// Backend root path
    fn root(&self) -> &Path;

    /// Names of all registered containers
    fn list(&self) -> Result<Vec<String>>;

    /// Observed state of a container
    fn state(&self, name: &str) -> Result<ContainerState>;

    /// Stop a container
    fn stop(&self, name: &str) -> Result<()>;

    /// Start a container
    fn start(&self, name: &str) -> Result<()>;
}

/// Enumerate every registered container together with its current state
pub fn scan(backend: &dyn ContainerBackend) -> Result<Vec<Container>> {
    backend
        .list()?
        .into_iter()
        .map(|name| {
            let state = backend.state(&name)?;
            Ok(Container { name, state })
        })
        .collect()
}

/// Entry of the `list` report
#[derive(Debug, Serialize)]
pub struct ContainerSummary {
    pub name: String,
    pub state: ContainerState,
    pub path: PathBuf,
}

/// Describe every registered container for the `list` command
pub fn summarize(backend: &dyn ContainerBackend) -> Result<Vec<ContainerSummary>> {
    Ok(scan(backend)?
        .into_iter()
        .map(|c| ContainerSummary {
            path: backend.root().join(&c.name),
            name: c.name,
            state: c.state,
        })
        .collect())
}
