//! The `autosetup` entry point
//!
//! Checks privileges, asks for confirmation, then wires the real LXC,
//! network and provisioning collaborators into one coordinator run.

use crate::container::LxcTools;
use crate::error::{Error, Result};
use crate::lifecycle::{Coordinator, ReconfigureReport, ReconfigureSteps};
use crate::manifest::ToolConfig;
use crate::network::{BridgeFile, BridgeSetup, IpCommand, SubnetAllocator, Systemctl};
use crate::provision::{DirectorySet, IdKind, SubIdFile, UsernetFile};
use crate::sys;
use std::io::{self, BufRead, Write};

const WARNING: &str = "WARNING: This will override existing configurations and restart all your containers, are you sure?";

/// Options for an autosetup run
#[derive(Debug, Clone, Copy, Default)]
pub struct AutosetupOptions {
    /// Skip the confirmation prompt
    pub yes: bool,
    /// Leave the bridge configuration alone
    pub no_bridge: bool,
    pub verbose: bool,
}

/// Ask a yes/no question; only `y` or `yes` count as consent
pub fn confirm<R: BufRead, W: Write>(question: &str, input: &mut R, output: &mut W) -> Result<bool> {
    write!(output, "{} [y/N] ", question)?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;

    Ok(matches!(
        answer.trim().to_ascii_lowercase().as_str(),
        "y" | "yes"
    ))
}

/// Reconfigure the host for unprivileged containers
pub fn autosetup(config: &ToolConfig, opts: &AutosetupOptions) -> Result<ReconfigureReport> {
    sys::require_root()?;

    if !opts.yes {
        let stdin = io::stdin();
        if !confirm(WARNING, &mut stdin.lock(), &mut io::stdout())? {
            return Err(Error::UserCancelled);
        }
    }

    let user = sys::lookup_user(&config.config.container_user)?;

    let backend = LxcTools::new(&config.config.target_path, &user.name);

    let net = &config.network;
    let allocator = SubnetAllocator::new(IpCommand, net.subnet_policy()?).verbose(opts.verbose);
    let bridge = BridgeSetup::new(
        allocator,
        BridgeFile::new(&net.bridge_file),
        &net.bridge_name,
        Systemctl,
        &net.service,
    )
    .skip(opts.no_bridge)
    .verbose(opts.verbose);

    let idmap = &config.idmap;
    let uid_range = SubIdFile::new(IdKind::User, &idmap.subuid_file, &user.name, user.uid)
        .range(idmap.range_start, idmap.range_size);
    let gid_range = SubIdFile::new(IdKind::Group, &idmap.subgid_file, &user.name, user.gid)
        .range(idmap.range_start, idmap.range_size);

    let usernet = UsernetFile::new(
        &config.usernet.file,
        &user.name,
        &config.usernet.interface_type,
        &net.bridge_name,
        config.usernet.count,
    );

    let directories = DirectorySet::new(config.required_dirs())
        .owner(user.uid, user.gid)
        .verbose(opts.verbose);

    let steps = ReconfigureSteps {
        bridge: &bridge,
        uid_range: &uid_range,
        gid_range: &gid_range,
        usernet: &usernet,
        directories: &directories,
    };

    Coordinator::new(&backend, steps).verbose(opts.verbose).run()
}
