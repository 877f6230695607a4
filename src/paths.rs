//! Resolution of logical sound names to loadable paths.

use std::path::{Path, PathBuf};

/// Turns the name a host passes to `load` into a file path.
pub trait PathResolver {
    fn resolve(&self, name: &str) -> PathBuf;
}

/// Joins relative names onto a data directory; absolute paths pass through.
#[derive(Debug, Clone)]
pub struct DataDirResolver {
    root: PathBuf,
}

impl DataDirResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for DataDirResolver {
    fn default() -> Self {
        Self::new("data")
    }
}

impl PathResolver for DataDirResolver {
    fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}
