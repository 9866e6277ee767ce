//! Host privilege and account lookups

use crate::error::{Error, Result};
use nix::unistd::{User, geteuid};

/// Fail unless running with an effective uid of 0
pub fn require_root() -> Result<()> {
    if geteuid().is_root() {
        Ok(())
    } else {
        Err(Error::Privilege)
    }
}

/// The unprivileged account containers are started as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerUser {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

/// Look up an account in the host user database
pub fn lookup_user(name: &str) -> Result<ContainerUser> {
    let user = User::from_name(name)
        .map_err(|e| Error::ExternalCommand {
            step: "User lookup".to_string(),
            message: format!("Failed to lookup user {}: {}", name, e),
        })?
        .ok_or_else(|| Error::UserNotFound(name.to_string()))?;

    Ok(ContainerUser {
        name: user.name,
        uid: user.uid.as_raw(),
        gid: user.gid.as_raw(),
    })
}
