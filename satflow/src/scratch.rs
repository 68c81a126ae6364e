//! Stage-local scratch storage.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// A scratch directory owned by one stage invocation.
///
/// Contents are removed by [`ScratchDir::clear`] and the directory itself
/// when the value is dropped, so reused execution environments never see a
/// previous invocation's files.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Creates a scratch directory under the system temp dir, or `root`.
    pub fn new(root: Option<&Path>) -> std::io::Result<Self> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("satflow-");
            b
        };
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "Scratch directory created");
        Ok(Self { dir })
    }

    /// Returns the directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the path of a file inside the directory.
    #[must_use]
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Creates (if needed) and returns a sub-directory.
    pub fn subdir(&self, name: &str) -> std::io::Result<PathBuf> {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// Removes everything inside the directory. Failures are logged.
    pub fn clear(&self) {
        let entries = match std::fs::read_dir(self.dir.path()) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.dir.path().display(), error = %e, "Cannot read scratch directory");
                return;
            }
        };
        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            let result = if path.is_dir() && !path.is_symlink() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %path.display(), error = %e, "Cannot remove scratch entry"),
            }
        }
        debug!(path = %self.dir.path().display(), removed, "Scratch directory cleared");
    }

    /// Returns true if the directory has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        std::fs::read_dir(self.dir.path())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }
}
