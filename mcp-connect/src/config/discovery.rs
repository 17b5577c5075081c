//! Config file discovery.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// The directories consulted when no explicit path is given.
///
/// Captured once so lookups are reproducible and tests can point the search
/// at temporary directories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPaths {
    /// Working directory; `None` skips the working-directory candidate.
    pub cwd: Option<PathBuf>,
    /// Home directory; `None` skips both home candidates.
    pub home: Option<PathBuf>,
}

impl SearchPaths {
    /// Creates search paths from explicit directories.
    #[must_use]
    pub fn new(cwd: Option<PathBuf>, home: Option<PathBuf>) -> Self {
        Self { cwd, home }
    }

    /// Captures the process working directory and the user's home directory.
    #[must_use]
    pub fn from_env() -> Self {
        let cwd = match std::env::current_dir() {
            Ok(dir) => Some(dir),
            Err(e) => {
                warn!(error = %e, "could not determine working directory for config search");
                None
            }
        };
        let home = dirs_next::home_dir();
        if home.is_none() {
            warn!("could not determine home directory for config search");
        }
        Self { cwd, home }
    }

    /// Lists candidate paths in lookup order.
    ///
    /// An explicit path is the only candidate; a relative one is made
    /// absolute against the working directory.
    #[must_use]
    pub fn candidates(&self, file_name: &str, explicit: Option<&Path>) -> Vec<PathBuf> {
        if let Some(path) = explicit {
            return vec![self.absolute(path)];
        }

        let mut paths = Vec::with_capacity(3);
        if let Some(cwd) = &self.cwd {
            paths.push(cwd.join(file_name));
        }
        if let Some(home) = &self.home {
            paths.push(home.join(format!(".{file_name}")));
            paths.push(home.join(".config").join("mcp").join(file_name));
        }
        paths
    }

    /// Returns the first candidate that exists and is a regular file.
    #[must_use]
    pub fn locate(&self, file_name: &str, explicit: Option<&Path>) -> Option<PathBuf> {
        for path in self.candidates(file_name, explicit) {
            match std::fs::metadata(&path) {
                Ok(meta) if meta.is_file() => {
                    debug!(path = %path.display(), "found configuration file");
                    return Some(path);
                }
                Ok(_) => debug!(path = %path.display(), "config candidate is not a regular file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "could not access config candidate");
                }
            }
        }

        debug!(
            file = file_name,
            "configuration file not found in specified or standard locations"
        );
        None
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match &self.cwd {
            Some(cwd) => cwd.join(path),
            None => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
        }
    }
}
