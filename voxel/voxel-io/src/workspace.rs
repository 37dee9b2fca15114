//! Per-run temporary directories and resilient file deletion.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{IoError, IoResult};
use crate::ri_block::RiBlockFiles;

/// Name of the directory grouping all runs under the base temp directory.
pub const TEMP_ROOT_NAME: &str = "thickness_temp";

/// Bounded exponential backoff for deleting files that may still be held
/// open, e.g. by a mapping that the OS releases lazily.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use voxel_io::RetryPolicy;
///
/// let policy = RetryPolicy::default().with_attempts(3);
/// assert_eq!(policy.delay(0), Duration::from_millis(10));
/// assert_eq!(policy.delay(1), Duration::from_millis(20));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first.
    pub attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 6,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Sets the number of attempts.
    #[must_use]
    pub const fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Delay before retry number `retry + 1`, doubling each time.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        self.initial_delay
            .saturating_mul(1u32.checked_shl(retry).unwrap_or(u32::MAX))
            .min(self.max_delay)
    }
}

/// Deletes `path`, retrying with backoff on failure.
///
/// A file that is already gone counts as deleted.
///
/// # Errors
///
/// Returns the last error once all attempts are exhausted.
pub fn remove_file_with_retry(path: &Path, policy: &RetryPolicy) -> IoResult<()> {
    let attempts = policy.attempts.max(1);
    let mut retry = 0;
    loop {
        match std::fs::remove_file(path) {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) if retry + 1 >= attempts => return Err(IoError::Io(err)),
            Err(err) => {
                debug!(path = %path.display(), error = %err, retry, "Delete failed, retrying");
                std::thread::sleep(policy.delay(retry));
                retry += 1;
            }
        }
    }
}

/// A uniquely named directory for the temporary files of one run.
///
/// The directory lives at `<base>/thickness_temp/ri_<uuid>` and is removed,
/// along with anything left in it, when the workspace is dropped.
///
/// # Example
///
/// ```
/// use voxel_io::TempWorkspace;
///
/// let base = tempfile::tempdir().unwrap();
/// let dir = {
///     let workspace = TempWorkspace::create(Some(base.path())).unwrap();
///     assert!(workspace.dir().is_dir());
///     workspace.dir().to_path_buf()
/// };
/// assert!(!dir.exists());
/// ```
#[derive(Debug)]
pub struct TempWorkspace {
    dir: PathBuf,
    retry: RetryPolicy,
}

impl TempWorkspace {
    /// Creates a fresh workspace under `base`, or the system temp directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create(base: Option<&Path>) -> IoResult<Self> {
        let base = base.map_or_else(std::env::temp_dir, Path::to_path_buf);
        let dir = base
            .join(TEMP_ROOT_NAME)
            .join(format!("ri_{}", Uuid::new_v4().simple()));
        std::fs::create_dir_all(&dir).map_err(|source| IoError::Open {
            path: dir.clone(),
            source,
        })?;
        info!(dir = %dir.display(), "Created temporary workspace");
        Ok(Self {
            dir,
            retry: RetryPolicy::default(),
        })
    }

    /// Replaces the deletion retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The workspace directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files holding the center sets produced by sweep dimension `dim`.
    #[must_use]
    pub fn dimension_files(&self, dim: usize, dimensions: [usize; 3]) -> RiBlockFiles {
        RiBlockFiles::new(self.dir.join(format!("ri_dim{dim}")), dimensions)
    }

    /// Deletes the files of sweep dimension `dim`.
    ///
    /// Returns the number of files that survived all retries.
    #[must_use]
    pub fn remove_dimension(&self, dim: usize, dimensions: [usize; 3]) -> usize {
        let failed = self.dimension_files(dim, dimensions).remove(&self.retry);
        if failed > 0 {
            warn!(dim, failed, "Temporary files left behind");
        } else {
            debug!(dim, "Removed temporary files");
        }
        failed
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if let Ok(entries) = std::fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                if let Err(err) = remove_file_with_retry(&entry.path(), &self.retry) {
                    warn!(path = %entry.path().display(), error = %err, "Failed to delete temporary file");
                }
            }
        }
        if let Err(err) = std::fs::remove_dir(&self.dir) {
            warn!(dir = %self.dir.display(), error = %err, "Failed to remove temporary workspace");
        }
        if let Some(root) = self.dir.parent() {
            // Fails harmlessly while other runs still use it.
            let _ = std::fs::remove_dir(root);
        }
    }
}
