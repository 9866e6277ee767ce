//! Host provisioning collaborators
//!
//! Provides:
//! - Subordinate UID/GID ranges for the container user
//! - The lxc-usernet allowance for the bridge
//! - Required directories

pub mod dirs;
pub mod idmap;
pub mod usernet;

use crate::error::Result;

pub use dirs::DirectorySet;
pub use idmap::{IdKind, IdMap, SubIdFile};
pub use usernet::UsernetFile;

/// A subordinate ID range for one ID space
pub trait IdentityRange {
    /// Which ID space this covers
    fn kind(&self) -> IdKind;

    /// Return the owner's mapping, creating the range if allowed
    fn ensure(&self, create: bool) -> Result<IdMap>;
}

/// Per-user container network allowance
pub trait NetworkMapping {
    fn ensure(&self) -> Result<()>;
}

/// Directories the backend needs before containers start
pub trait RequiredDirectories {
    fn ensure(&self, create: bool) -> Result<()>;
}
