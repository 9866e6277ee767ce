//! Unified error types for ocsdk-target

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for ocsdk-target operations
#[derive(Error, Debug)]
pub enum Error {
    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // Config errors
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    // Entry point errors
    #[error("This command needs to run as root")]
    Privilege,

    #[error("Cancelled by user")]
    UserCancelled,

    #[error("User '{0}' not found")]
    UserNotFound(String),

    // External commands
    #[error("{step} failed: {message}")]
    ExternalCommand { step: String, message: String },

    #[error("Command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    // Subnet allocation errors
    #[error("Invalid ip addr output: {0}")]
    MalformedInterfaceOutput(String),

    #[error("No valid subnet available in {prefix}.1.0 - {prefix}.{max}.0")]
    SubnetsExhausted { prefix: String, max: u8 },

    // Bridge config file errors
    #[error("Failed to update bridge config '{path}': {source}")]
    ConfigIo { path: PathBuf, source: io::Error },

    // Container errors
    #[error("Could not stop container {name}: {message}")]
    ContainerStopFailed { name: String, message: String },

    #[error("Could not start container {name}: {message}")]
    ContainerStartFailed { name: String, message: String },

    // Provisioning errors
    #[error("Invalid entry in '{path}' line {line}: {message}")]
    SubIdFile {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("ID range setup in '{path}': {message}")]
    IdRange { path: PathBuf, message: String },

    #[error("Directory '{path}': {message}")]
    Directory { path: PathBuf, message: String },

    // Lifecycle errors
    #[error("Invalid lifecycle transition: {0}")]
    InvalidTransition(String),
}

impl Error {
    /// Wrap a failure with the name of the step that produced it
    ///
    /// Errors that already name a step are returned unchanged.
    pub fn at_step(self, step: &str) -> Self {
        match self {
            Error::ExternalCommand { .. } => self,
            other => Error::ExternalCommand {
                step: step.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Result type alias for ocsdk-target operations
pub type Result<T> = std::result::Result<T, Error>;
