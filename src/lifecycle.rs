//! Stop-reconfigure-restart lifecycle
//!
//! This module provides:
//! - The run state machine (Scanning → Stopping → Reconfiguring → Restarting → Done)
//! - The coordinator driving containers and collaborators through it

pub mod coordinator;
pub mod state;

// Re-exports
pub use coordinator::{Coordinator, ReconfigureReport, ReconfigureSteps};
pub use state::Phase;
