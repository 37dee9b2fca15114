//! Error types for voxel grid operations.

use crate::VoxelCoord;

/// Errors that can occur when building or addressing voxel grids.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum VoxelError {
    /// The grid dimensions are invalid (zero extent or overflowing voxel count).
    #[error("invalid grid dimensions: {width}x{height}x{depth}")]
    InvalidDimensions {
        /// Width dimension.
        width: usize,
        /// Height dimension.
        height: usize,
        /// Depth dimension.
        depth: usize,
    },

    /// A coordinate lies outside the grid.
    #[error("coordinate {coord:?} is out of bounds")]
    OutOfBounds {
        /// The coordinate that was out of bounds.
        coord: VoxelCoord,
    },

    /// The number of samples does not match the grid dimensions.
    #[error("expected {expected} samples, got {actual}")]
    SizeMismatch {
        /// Voxel count implied by the dimensions.
        expected: usize,
        /// Number of samples supplied.
        actual: usize,
    },

    /// A block does not fit inside its parent grid.
    #[error("block at {origin:?} with size {size:?} does not fit in grid {grid:?}")]
    InvalidBlock {
        /// Block origin.
        origin: VoxelCoord,
        /// Block size.
        size: [usize; 3],
        /// Parent grid dimensions.
        grid: [usize; 3],
    },
}

/// Result type for voxel grid operations.
pub type VoxelResult<T> = Result<T, VoxelError>;
