//! Single-writer advisory lock for the snapshot file

use super::StoreError;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Held for the duration of a write. The lock file is created exclusively
/// and removed on drop; a second writer gets [`StoreError::Locked`].
#[derive(Debug)]
pub struct WriteLock {
    path: PathBuf,
}

impl WriteLock {
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                // Owner pid helps when cleaning up after a crashed sync
                let _ = writeln!(file, "{}", std::process::id());
                tracing::debug!("Acquired snapshot lock {:?}", path);
                Ok(Self {
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(StoreError::Locked {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("Failed to release snapshot lock {:?}: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_writer_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json.lock");

        let first = WriteLock::acquire(&path).unwrap();
        let second = WriteLock::acquire(&path);
        assert!(matches!(second, Err(StoreError::Locked { .. })));

        drop(first);
        assert!(!path.exists());
        assert!(WriteLock::acquire(&path).is_ok());
    }
}
