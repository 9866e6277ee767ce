//! Bridge network management for the container host
//!
//! Provides:
//! - Free /24 discovery from live interface addresses
//! - Order-preserving edits of the bridge service's KEY=VALUE file
//! - Enable/restart of the bridge service
//! - The combined bridge step run while containers are stopped

pub mod bridge;
pub mod service;
pub mod setup;
pub mod subnet;

pub use bridge::{BridgeFile, BridgeSettings};
pub use service::{ServiceManager, Systemctl};
pub use setup::{BridgeOutcome, BridgeSetup, BridgeStep};
pub use subnet::{AddressSource, IpCommand, SubnetAllocator, SubnetCandidate, SubnetPolicy};
