//! Subordinate ID ranges (`/etc/subuid`, `/etc/subgid`)
//!
//! Each line is `owner:start:count`. A new range for the owner starts after
//! the highest range already handed out, and never below the configured floor.

use crate::error::{Error, Result};
use crate::provision::IdentityRange;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// ID space a subordinate file covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdKind {
    User,
    Group,
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdKind::User => write!(f, "subUID"),
            IdKind::Group => write!(f, "subGID"),
        }
    }
}

/// A contiguous block of IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub start: u32,
    pub count: u32,
}

impl IdRange {
    /// First ID past the range
    pub fn end(&self) -> u64 {
        u64::from(self.start) + u64::from(self.count)
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end() - 1)
    }
}

/// The owner's own ID and the subordinate block mapped into containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdMap {
    pub host_id: u32,
    pub subordinate: IdRange,
}

/// Parse `owner:start:count` entries, skipping blanks and comments
fn parse_entries(content: &str, path: &Path) -> Result<Vec<(String, IdRange)>> {
    let mut entries = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let invalid = |message: String| Error::SubIdFile {
            path: path.to_path_buf(),
            line: idx + 1,
            message,
        };

        let fields: Vec<&str> = trimmed.split(':').collect();
        if fields.len() != 3 {
            return Err(invalid(format!("expected owner:start:count, got '{}'", trimmed)));
        }

        let start = fields[1]
            .parse::<u32>()
            .map_err(|_| invalid(format!("invalid start '{}'", fields[1])))?;
        let count = fields[2]
            .parse::<u32>()
            .map_err(|_| invalid(format!("invalid count '{}'", fields[2])))?;

        entries.push((fields[0].to_string(), IdRange { start, count }));
    }

    Ok(entries)
}

/// A subordinate ID file for one owner
#[derive(Debug, Clone)]
pub struct SubIdFile {
    kind: IdKind,
    path: PathBuf,
    owner: String,
    host_id: u32,
    range_start: u32,
    range_size: u32,
}

impl SubIdFile {
    pub fn new(kind: IdKind, path: impl Into<PathBuf>, owner: impl Into<String>, host_id: u32) -> Self {
        Self {
            kind,
            path: path.into(),
            owner: owner.into(),
            host_id,
            range_start: 100_000,
            range_size: 65_536,
        }
    }

    /// Floor and size used for newly created ranges
    pub fn range(mut self, start: u32, size: u32) -> Self {
        self.range_start = start;
        self.range_size = size;
        self
    }

    fn read(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// Pick the next free block after every existing range
    fn next_range(&self, entries: &[(String, IdRange)]) -> Result<IdRange> {
        let start = entries
            .iter()
            .map(|(_, range)| range.end())
            .fold(u64::from(self.range_start), u64::max);

        let range = IdRange {
            start: u32::try_from(start).map_err(|_| self.exhausted())?,
            count: self.range_size,
        };
        if range.end() > u64::from(u32::MAX) {
            return Err(self.exhausted());
        }
        Ok(range)
    }

    fn exhausted(&self) -> Error {
        Error::IdRange {
            path: self.path.clone(),
            message: format!("no room for another {} IDs", self.range_size),
        }
    }
}

impl IdentityRange for SubIdFile {
    fn kind(&self) -> IdKind {
        self.kind
    }

    fn ensure(&self, create: bool) -> Result<IdMap> {
        let content = self.read()?;
        let entries = parse_entries(&content, &self.path)?;

        if let Some((_, range)) = entries.iter().find(|(owner, _)| *owner == self.owner) {
            return Ok(IdMap {
                host_id: self.host_id,
                subordinate: *range,
            });
        }

        if !create {
            return Err(Error::IdRange {
                path: self.path.clone(),
                message: format!("no {} range for '{}'", self.kind, self.owner),
            });
        }

        let range = self.next_range(&entries)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if !content.is_empty() && !content.ends_with('\n') {
            file.write_all(b"\n")?;
        }
        writeln!(file, "{}:{}:{}", self.owner, range.start, range.count)?;

        Ok(IdMap {
            host_id: self.host_id,
            subordinate: range,
        })
    }
}
