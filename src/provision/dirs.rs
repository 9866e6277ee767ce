//! Required directories for the container backend

use crate::error::{Error, Result};
use crate::provision::RequiredDirectories;
use std::fs;
use std::io;
use std::os::unix::fs::chown;
use std::path::PathBuf;

/// A set of directories that must exist
#[derive(Debug, Clone)]
pub struct DirectorySet {
    dirs: Vec<PathBuf>,
    /// uid/gid given to directories this tool creates
    owner: Option<(u32, u32)>,
    verbose: bool,
}

impl DirectorySet {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            owner: None,
            verbose: false,
        }
    }

    /// Hand newly created directories to this owner
    pub fn owner(mut self, uid: u32, gid: u32) -> Self {
        self.owner = Some((uid, gid));
        self
    }

    /// Enable verbose output
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

impl RequiredDirectories for DirectorySet {
    fn ensure(&self, create: bool) -> Result<()> {
        for dir in &self.dirs {
            match fs::metadata(dir) {
                Ok(meta) if meta.is_dir() => continue,
                Ok(_) => {
                    return Err(Error::Directory {
                        path: dir.clone(),
                        message: "exists but is not a directory".to_string(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::Directory {
                        path: dir.clone(),
                        message: e.to_string(),
                    });
                }
            }

            if !create {
                return Err(Error::Directory {
                    path: dir.clone(),
                    message: "does not exist".to_string(),
                });
            }

            fs::create_dir_all(dir).map_err(|e| Error::Directory {
                path: dir.clone(),
                message: e.to_string(),
            })?;

            if let Some((uid, gid)) = self.owner {
                chown(dir, Some(uid), Some(gid)).map_err(|e| Error::Directory {
                    path: dir.clone(),
                    message: format!("chown to {}:{} failed: {}", uid, gid, e),
                })?;
            }

            if self.verbose {
                println!("  Created {}", dir.display());
            }
        }

        Ok(())
    }
}
