//! Subnet allocation for the container bridge
//!
//! Picks the lowest free `A.B.X.0/24` block by reading the addresses that are
//! currently assigned to host interfaces. Nothing is persisted: the used set
//! is rebuilt from `ip addr show` on every run, so the result is only valid
//! at the moment it is computed.

use crate::error::{Error, Result};
use ipnet::Ipv4Net;
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::process::Command;

const STEP: &str = "interface enumeration";

/// Source of the host's interface address listing
pub trait AddressSource {
    /// Return the textual `ip addr` style listing
    fn interface_addresses(&self) -> Result<String>;
}

/// Reads interface addresses with `ip addr show`
#[derive(Debug, Default, Clone, Copy)]
pub struct IpCommand;

impl AddressSource for IpCommand {
    fn interface_addresses(&self) -> Result<String> {
        let output = Command::new("ip")
            .args(["addr", "show"])
            .output()
            .map_err(|e| Error::ExternalCommand {
                step: STEP.to_string(),
                message: format!("Failed to run ip addr show: {}", e),
            })?;

        if !output.status.success() {
            return Err(Error::ExternalCommand {
                step: STEP.to_string(),
                message: format!(
                    "ip addr show exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Private range searched for a free /24
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetPolicy {
    /// First two octets of every candidate block
    prefix: [u8; 2],
    /// Highest third octet considered
    max: u8,
}

impl SubnetPolicy {
    /// Upper bound for the third octet (255 would make the gateway a broadcast)
    pub const MAX_SUBNET: u8 = 254;

    /// Create a policy for `prefix.X.0/24` with `1 <= X <= max`
    pub fn new(prefix: [u8; 2], max: u8) -> Result<Self> {
        if max == 0 || max > Self::MAX_SUBNET {
            return Err(Error::ConfigValidation(format!(
                "max_subnet must be between 1 and {}, got {}",
                Self::MAX_SUBNET,
                max
            )));
        }
        Ok(Self { prefix, max })
    }

    #[cfg(test)]
    pub fn prefix(&self) -> [u8; 2] {
        self.prefix
    }

    /// Address prefix an interface address must start with, e.g. `10.0.`
    fn address_marker(&self) -> String {
        format!("{}.{}.", self.prefix[0], self.prefix[1])
    }

    /// The /24 block for a third octet
    fn block(&self, octet: u8) -> Result<Ipv4Net> {
        Ipv4Net::new(Ipv4Addr::new(self.prefix[0], self.prefix[1], octet, 0), 24)
            .map_err(|e| Error::ConfigValidation(e.to_string()))
    }
}

impl Default for SubnetPolicy {
    fn default() -> Self {
        Self {
            prefix: [10, 0],
            max: Self::MAX_SUBNET,
        }
    }
}

impl fmt::Display for SubnetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.prefix[0], self.prefix[1])
    }
}

/// A free /24 block, identified by its third octet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubnetCandidate {
    octet: u8,
    network: Ipv4Net,
}

impl SubnetCandidate {
    /// Third octet of the block
    pub fn octet(&self) -> u8 {
        self.octet
    }

    /// The block itself (`A.B.X.0/24`)
    pub fn network(&self) -> Ipv4Net {
        self.network
    }
}

impl fmt::Display for SubnetCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.network)
    }
}

/// Collect the third octets already in use within the policy's range
///
/// Only `inet` lines whose address starts with the policy prefix count. An
/// address inside the prefix that cannot be parsed is an error rather than
/// being skipped, so nothing is allocated on top of an address we could not read.
pub fn used_subnets(output: &str, policy: &SubnetPolicy) -> Result<BTreeSet<u8>> {
    let marker = policy.address_marker();
    let mut used = BTreeSet::new();

    for line in output.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let mut columns = trimmed.split_whitespace();
        if columns.next() != Some("inet") {
            continue;
        }

        let addr = columns.next().ok_or_else(|| {
            Error::MalformedInterfaceOutput(format!("missing address in line '{}'", trimmed))
        })?;

        if !addr.starts_with(&marker) {
            continue;
        }

        let octets: Vec<&str> = addr.split('.').collect();
        if octets.len() < 4 {
            return Err(Error::MalformedInterfaceOutput(format!(
                "invalid ip addr {}",
                addr
            )));
        }

        let subnet = octets[2].parse::<u8>().map_err(|_| {
            Error::MalformedInterfaceOutput(format!(
                "invalid subnet octet '{}' in {}",
                octets[2], addr
            ))
        })?;

        used.insert(subnet);
    }

    Ok(used)
}

/// Lowest third octet in `1..=max` that is not in use
pub fn lowest_free(used: &BTreeSet<u8>, policy: &SubnetPolicy) -> Result<SubnetCandidate> {
    let octet = (1..=policy.max)
        .find(|n| !used.contains(n))
        .ok_or_else(|| Error::SubnetsExhausted {
            prefix: policy.to_string(),
            max: policy.max,
        })?;

    Ok(SubnetCandidate {
        octet,
        network: policy.block(octet)?,
    })
}

/// Allocates a free bridge subnet from live interface state
pub struct SubnetAllocator<S> {
    source: S,
    policy: SubnetPolicy,
    verbose: bool,
}

impl<S: AddressSource> SubnetAllocator<S> {
    /// Create an allocator reading from `source`
    pub fn new(source: S, policy: SubnetPolicy) -> Self {
        Self {
            source,
            policy,
            verbose: false,
        }
    }

    /// Enable verbose output
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Pick the lowest unused subnet
    ///
    /// Failures to list interfaces are returned as-is; no subnet is guessed.
    pub fn allocate(&self) -> Result<SubnetCandidate> {
        let output = self.source.interface_addresses()?;
        let used = used_subnets(&output, &self.policy)?;

        if self.verbose {
            let list: Vec<String> = used.iter().map(|n| n.to_string()).collect();
            println!(
                "  Subnets in use under {}: [{}]",
                self.policy,
                list.join(", ")
            );
        }

        let candidate = lowest_free(&used, &self.policy)?;
        if self.verbose {
            println!("  Selected subnet {} (block {})", candidate, candidate.octet());
        }
        Ok(candidate)
    }
}
