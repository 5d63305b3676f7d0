//! Single-instance guard

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::application::errors::BotError;

/// Lock file held for the lifetime of the process, removed on drop
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
}

impl InstanceLock {
    /// Create the lock file, failing if another instance already holds it
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self, BotError> {
        let path = path.as_ref().to_path_buf();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(BotError::AlreadyRunning(path));
            }
            Err(e) => {
                return Err(BotError::Internal(format!(
                    "Failed to create lock file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        if let Err(e) = writeln!(file, "{}", std::process::id()) {
            tracing::warn!("Failed to write pid to {}: {}", path.display(), e);
        }

        tracing::debug!("Acquired instance lock {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_until_released() {
        let path = std::env::temp_dir().join(format!("modbot-{}.lock", uuid::Uuid::new_v4()));

        let lock = InstanceLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert!(matches!(InstanceLock::acquire(&path), Err(BotError::AlreadyRunning(_))));

        drop(lock);
        assert!(!path.exists());
        let again = InstanceLock::acquire(&path).unwrap();
        assert_eq!(again.path(), path.as_path());
    }
}
