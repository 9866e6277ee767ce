//! lxc-usernet allowance for the container user
//!
//! Entries look like `user type bridge count`. The entry for this user,
//! interface type and bridge is kept at exactly one line with the configured
//! count; everything else in the file is left alone.

use crate::error::Result;
use crate::provision::NetworkMapping;
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct UsernetFile {
    path: PathBuf,
    user: String,
    interface_type: String,
    bridge: String,
    count: u32,
}

impl UsernetFile {
    pub fn new(
        path: impl Into<PathBuf>,
        user: impl Into<String>,
        interface_type: impl Into<String>,
        bridge: impl Into<String>,
        count: u32,
    ) -> Self {
        Self {
            path: path.into(),
            user: user.into(),
            interface_type: interface_type.into(),
            bridge: bridge.into(),
            count,
        }
    }

    fn entry(&self) -> String {
        format!(
            "{} {} {} {}",
            self.user, self.interface_type, self.bridge, self.count
        )
    }

    fn is_ours(&self, line: &str) -> bool {
        if line.trim_start().starts_with('#') {
            return false;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        fields.len() == 4
            && fields[0] == self.user
            && fields[1] == self.interface_type
            && fields[2] == self.bridge
    }

    /// Rewrite `existing` so it holds exactly one entry for this user
    fn reconcile(&self, existing: &str) -> String {
        let entry = self.entry();
        let mut found = false;
        let mut out = String::with_capacity(existing.len() + entry.len() + 1);

        for line in existing.lines() {
            if self.is_ours(line) {
                if found {
                    continue;
                }
                found = true;
                out.push_str(&entry);
            } else {
                out.push_str(line);
            }
            out.push('\n');
        }

        if !found {
            out.push_str(&entry);
            out.push('\n');
        }

        out
    }
}

impl NetworkMapping for UsernetFile {
    fn ensure(&self) -> Result<()> {
        let existing = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        let updated = self.reconcile(&existing);
        if updated == existing {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, updated)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usernet(path: PathBuf) -> UsernetFile {
        UsernetFile::new(path, "ocsdk", "veth", "lxcbr0", 10)
    }

    #[test]
    fn test_creates_file_and_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lxc").join("lxc-usernet");

        usernet(path.clone()).ensure().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "ocsdk veth lxcbr0 10\n");
    }

    #[test]
    fn test_updates_count_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lxc-usernet");
        fs::write(
            &path,
            "# USERNAME TYPE BRIDGE COUNT\nalice veth lxcbr0 2\nocsdk veth lxcbr0 1\nocsdk veth br1 5\nocsdk veth lxcbr0 3\n",
        )
        .unwrap();

        usernet(path.clone()).ensure().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# USERNAME TYPE BRIDGE COUNT\nalice veth lxcbr0 2\nocsdk veth lxcbr0 10\nocsdk veth br1 5\n"
        );
    }

    #[test]
    fn test_commented_entry_ignored() {
        let file = usernet(PathBuf::from("/unused"));
        let out = file.reconcile("#ocsdk veth lxcbr0 1\n");
        assert_eq!(out, "#ocsdk veth lxcbr0 1\nocsdk veth lxcbr0 10\n");
    }

    #[test]
    fn test_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lxc-usernet");
        fs::write(&path, "alice veth lxcbr0 2").unwrap();

        let file = usernet(path.clone());
        file.ensure().unwrap();
        let first = fs::read_to_string(&path).unwrap();
        file.ensure().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), first);
        assert_eq!(first, "alice veth lxcbr0 2\nocsdk veth lxcbr0 10\n");
    }
}
