//! Error types for local thickness computation.

use thiserror::Error;

/// Result type alias for thickness operations.
pub type ThicknessResult<T> = Result<T, ThicknessError>;

/// Errors that can occur while computing a local thickness map.
#[derive(Debug, Error)]
pub enum ThicknessError {
    /// Invalid parameters or input volume.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A fixed-width field or on-disk format limit was exceeded.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// The computation was cancelled through its interrupt flag.
    #[error("computation interrupted")]
    Interrupted,

    /// Temporary file I/O failed.
    #[error("I/O failed: {0}")]
    Io(#[from] voxel_io::IoError),

    /// Grid construction or addressing failed.
    #[error("voxel error: {0}")]
    Voxel(#[from] voxel_types::VoxelError),

    /// The worker pool could not be started.
    #[error("cannot start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl ThicknessError {
    /// Create an invalid argument error.
    #[must_use]
    pub fn invalid_argument(details: impl Into<String>) -> Self {
        Self::InvalidArgument(details.into())
    }

    /// Create a capacity exceeded error.
    #[must_use]
    pub fn capacity_exceeded(details: impl Into<String>) -> Self {
        Self::CapacityExceeded(details.into())
    }
}

/// Reasons a cached lookup table could not be used.
///
/// A miss is never fatal: the caller recomputes the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheMiss {
    /// No cache file exists.
    #[error("cache file missing")]
    Missing,
    /// A cache file exists but could not be read.
    #[error("cache file unreadable")]
    Unreadable,
    /// The cached tables are shorter than required.
    #[error("cached table too small")]
    TooSmall,
    /// The cached tables disagree in length.
    #[error("cached tables inconsistent")]
    Inconsistent,
}
