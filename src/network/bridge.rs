//! Bridge service configuration file
//!
//! Handles:
//! - Computing the bridge settings for an allocated subnet
//! - Reconciling those settings into a shell-style `KEY=VALUE` document
//!   while leaving every other line where it was
//! - Rewriting the file in one write once the new content is complete

use crate::error::{Error, Result};
use crate::network::SubnetCandidate;
use std::fs::OpenOptions;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::net::Ipv4Addr;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

/// Settings the bridge service needs, in the order they are appended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    entries: Vec<(&'static str, String)>,
}

impl BridgeSettings {
    /// Compute the bridge settings for a /24 block
    ///
    /// The gateway takes the first host address and DHCP hands out the rest.
    pub fn for_subnet(subnet: &SubnetCandidate, bridge_name: &str) -> Self {
        let net = subnet.network();
        let first = u32::from(net.network()) + 1;
        let last = u32::from(net.broadcast()) - 1;

        let gateway = Ipv4Addr::from(first);
        let dhcp_first = Ipv4Addr::from(first + 1);
        let dhcp_last = Ipv4Addr::from(last);
        let dhcp_max = last - first;

        Self {
            entries: vec![
                ("USE_LXC_BRIDGE", "true".to_string()),
                ("LXC_BRIDGE", bridge_name.to_string()),
                ("LXC_ADDR", gateway.to_string()),
                ("LXC_NETMASK", net.netmask().to_string()),
                ("LXC_NETWORK", format!("{}/{}", gateway, net.prefix_len())),
                ("LXC_DHCP_RANGE", format!("{},{}", dhcp_first, dhcp_last)),
                ("LXC_DHCP_MAX", dhcp_max.to_string()),
            ],
        }
    }

    /// Settings as ordered key/value pairs
    pub fn entries(&self) -> &[(&'static str, String)] {
        &self.entries
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| *k == key)
    }
}

/// One line of a bridge configuration document
///
/// Lines are raw bytes: only required keys are ever interpreted, so a
/// comment in some legacy encoding passes through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLine<'a> {
    /// Starts with `#`
    Comment,
    /// Empty or whitespace only
    Blank,
    /// `KEY=VALUE` with a shell-style variable name
    Assignment { key: &'a str, value: &'a [u8] },
    /// Anything else, passed through untouched
    Other,
}

impl<'a> ConfigLine<'a> {
    /// Classify a line (without its trailing newline)
    pub fn classify(line: &'a [u8]) -> Self {
        if line.starts_with(b"#") {
            return ConfigLine::Comment;
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            return ConfigLine::Blank;
        }
        let Some(eq) = line.iter().position(|&b| b == b'=') else {
            return ConfigLine::Other;
        };
        match std::str::from_utf8(&line[..eq]) {
            Ok(key) if is_variable_name(key) => ConfigLine::Assignment {
                key,
                value: &line[eq + 1..],
            },
            _ => ConfigLine::Other,
        }
    }
}

fn is_variable_name(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Strip one level of matching shell quotes
fn unquote(value: &[u8]) -> &[u8] {
    for quote in [b'"', b'\''] {
        if value.len() >= 2 && value[0] == quote && value[value.len() - 1] == quote {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Split into lines without their `\n`, keeping a final unterminated line
fn lines(content: &[u8]) -> impl Iterator<Item = &[u8]> {
    content
        .split_inclusive(|&b| b == b'\n')
        .map(|raw| raw.strip_suffix(b"\n").unwrap_or(raw))
}

/// Apply `settings` to the document `existing`
///
/// The first assignment of each required key is updated in place, later
/// duplicates are dropped, and missing keys are appended in settings order.
/// A required line that already carries the right value is kept byte for
/// byte, which makes the function idempotent. Every other line is copied
/// through as is, whatever its encoding.
pub fn reconcile(existing: &[u8], settings: &BridgeSettings) -> Vec<u8> {
    let entries = settings.entries();
    let mut satisfied = vec![false; entries.len()];
    let mut out = Vec::with_capacity(existing.len() + 256);

    for line in lines(existing) {
        if let ConfigLine::Assignment { key, value } = ConfigLine::classify(line)
            && let Some(idx) = settings.position(key)
        {
            if satisfied[idx] {
                continue;
            }
            satisfied[idx] = true;

            let required = &entries[idx].1;
            if unquote(value) == required.as_bytes() {
                out.extend_from_slice(line);
            } else {
                out.extend_from_slice(format!("{}=\"{}\"", key, required).as_bytes());
            }
            out.push(b'\n');
            continue;
        }

        out.extend_from_slice(line);
        out.push(b'\n');
    }

    for ((key, value), done) in entries.iter().zip(&satisfied) {
        if !done {
            out.extend_from_slice(format!("{}={}\n", key, value).as_bytes());
        }
    }

    out
}

/// The bridge service's configuration file on disk
#[derive(Debug, Clone)]
pub struct BridgeFile {
    path: PathBuf,
}

impl BridgeFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> Error {
        Error::ConfigIo {
            path: self.path.clone(),
            source,
        }
    }

    /// Write `settings` into the file, creating it if needed
    ///
    /// The new content is assembled in memory before the file is truncated,
    /// so only a crash during the final write can leave it short.
    pub fn apply(&self, settings: &BridgeSettings) -> Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o644)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        let mut existing = Vec::new();
        file.read_to_end(&mut existing)
            .map_err(|e| self.io_error(e))?;

        let updated = reconcile(&existing, settings);

        file.seek(SeekFrom::Start(0)).map_err(|e| self.io_error(e))?;
        file.set_len(0).map_err(|e| self.io_error(e))?;
        file.write_all(&updated)
            .map_err(|e| self.io_error(e))?;
        file.flush().map_err(|e| self.io_error(e))?;

        Ok(())
    }

    /// Check whether the file already enables `bridge_name` with an address
    pub fn is_configured(&self, bridge_name: &str) -> Result<bool> {
        let content = match std::fs::read(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(self.io_error(e)),
        };

        let lookup = |wanted: &str| {
            lines(&content).find_map(|line| match ConfigLine::classify(line) {
                ConfigLine::Assignment { key, value } if key == wanted => Some(unquote(value)),
                _ => None,
            })
        };

        let enabled = lookup("USE_LXC_BRIDGE") == Some(&b"true"[..]);
        let named = lookup("LXC_BRIDGE") == Some(bridge_name.as_bytes());
        let addressed = lookup("LXC_ADDR").is_some_and(|addr| !addr.is_empty());

        Ok(enabled && named && addressed)
    }
}
