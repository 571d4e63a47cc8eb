//! Advisory exclusive file locking.
use bmdb_core::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// An exclusive advisory lock on a sidecar `.lock` file, released when
/// dropped.
pub struct FileLock {
    path: PathBuf,
    file: File,
}

impl FileLock {
    /// Acquire an exclusive lock on `<base_path>.lock`, retrying until
    /// `timeout` elapses.
    pub fn acquire(base_path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let path = base_path.as_ref().with_extension("lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| Error::io("open", e))?;
        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(FileLock { path, file }),
                Err(_) if started.elapsed() < timeout => {
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(_) => {
                    return Err(Error::LockTimeout {
                        path: path.display().to_string(),
                    })
                }
            }
        }
    }

    /// The sidecar lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn second_acquire_times_out_while_first_is_held() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("data.bmdb");
        let _first = FileLock::acquire(&db_path, Duration::from_millis(200)).unwrap();
        let second = FileLock::acquire(&db_path, Duration::from_millis(50));
        assert!(second.is_err());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("data.bmdb");
        {
            let _first = FileLock::acquire(&db_path, Duration::from_millis(200)).unwrap();
        }
        let second = FileLock::acquire(&db_path, Duration::from_millis(200));
        assert!(second.is_ok());
    }
}
