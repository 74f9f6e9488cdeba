//! Single-instance lock scoped to the config file.
//!
//! Two reconcilers over the same fleet would double-bid; the lock file
//! keys on the config path so controllers for different fleets can
//! still run side by side.

use std::fs::OpenOptions;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use tracing::warn;

pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(scope: &Path) -> anyhow::Result<Self> {
        let mut hasher = DefaultHasher::new();
        scope.hash(&mut hasher);
        let path = std::env::temp_dir().join(format!("spot-controller-{:016x}.lock", hasher.finish()));

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{}", std::process::id());
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                bail!(
                    "another controller holds {} for this configuration",
                    path.display()
                )
            }
            Err(e) => Err(e).with_context(|| format!("cannot create lock {}", path.display())),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "could not remove lock file");
        }
    }
}
