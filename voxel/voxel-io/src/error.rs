//! Error types for voxel file I/O.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for voxel file I/O.
pub type IoResult<T> = Result<T, IoError>;

/// Errors that can occur while mapping, reading, or writing voxel files.
#[derive(Debug, Error)]
pub enum IoError {
    /// A file could not be opened or created.
    #[error("cannot open {path}: {source}")]
    Open {
        /// Path that failed to open.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A file could not be resized to the requested length.
    #[error("cannot resize {path} to {len} bytes: {source}")]
    Resize {
        /// File being resized.
        path: PathBuf,
        /// Requested length in bytes.
        len: u64,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// A window of the file could not be memory-mapped.
    #[error("cannot map {len} bytes at offset {offset} of {path}: {source}")]
    Map {
        /// File being mapped.
        path: PathBuf,
        /// Byte offset of the window.
        offset: u64,
        /// Length of the window in bytes.
        len: u64,
        /// Underlying OS error.
        source: std::io::Error,
    },

    /// An element index lies past the end of the file.
    #[error("element {index} of width {width} is out of range for a {len}-byte file")]
    OutOfRange {
        /// Element index.
        index: u64,
        /// Element width in bytes.
        width: u64,
        /// File length in bytes.
        len: u64,
    },

    /// A stored record is malformed.
    #[error("invalid record: {message}")]
    InvalidRecord {
        /// Description of what was invalid.
        message: String,
    },

    /// A value does not fit in its on-disk field.
    #[error("capacity exceeded: {message}")]
    CapacityExceeded {
        /// Description of the limit that was hit.
        message: String,
    },

    /// A caller-supplied argument is invalid.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the argument problem.
        message: String,
    },

    /// A write was attempted on a read-only mapping.
    #[error("{path} is mapped read-only")]
    ReadOnly {
        /// File that was opened read-only.
        path: PathBuf,
    },

    /// Grid construction failed.
    #[error("voxel error: {0}")]
    Voxel(#[from] voxel_types::VoxelError),

    /// I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IoError {
    /// Create an `InvalidRecord` error with the given message.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// Create a `CapacityExceeded` error with the given message.
    #[must_use]
    pub fn capacity_exceeded(message: impl Into<String>) -> Self {
        Self::CapacityExceeded {
            message: message.into(),
        }
    }

    /// Create an `InvalidArgument` error with the given message.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}
