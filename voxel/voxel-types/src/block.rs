//! Axis-aligned sub-boxes of a grid.

use crate::error::{VoxelError, VoxelResult};
use crate::grid::linear_index;
use crate::{Axis, VoxelCoord};

/// A rectangular sub-box of a grid, given by its origin and size.
///
/// Blocks are the unit of out-of-core processing: each one is loaded,
/// processed and written back independently. Sizes are clamped so that a
/// block never reaches past the parent grid.
///
/// # Example
///
/// ```
/// use voxel_types::{Block, VoxelCoord};
///
/// // A 4x4x4 block at (8, 0, 0) in a 10x10x10 grid is clamped to 2x4x4.
/// let block = Block::clamped(VoxelCoord::new(8, 0, 0), [4, 4, 4], [10, 10, 10]).unwrap();
/// assert_eq!(block.size(), [2, 4, 4]);
/// assert_eq!(block.voxel_count(), 32);
/// assert!(block.contains(VoxelCoord::new(9, 3, 3)));
/// assert!(!block.contains(VoxelCoord::new(7, 3, 3)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Block {
    origin: VoxelCoord,
    size: [usize; 3],
}

impl Block {
    /// A block covering the whole of a grid with the given extents.
    #[must_use]
    pub const fn whole(dimensions: [usize; 3]) -> Self {
        Self {
            origin: VoxelCoord::origin(),
            size: dimensions,
        }
    }

    /// Creates a block at `origin`, shrinking `size` to fit inside `grid`.
    ///
    /// # Errors
    ///
    /// Returns [`VoxelError::InvalidBlock`] if the origin lies outside the
    /// grid or any requested extent is zero.
    pub fn clamped(origin: VoxelCoord, size: [usize; 3], grid: [usize; 3]) -> VoxelResult<Self> {
        let invalid = VoxelError::InvalidBlock { origin, size, grid };
        let mut clamped = [0; 3];
        for axis in Axis::ALL {
            let i = axis.index();
            let start = usize::try_from(origin.component(axis)).map_err(|_| invalid.clone())?;
            if start >= grid[i] || size[i] == 0 {
                return Err(invalid);
            }
            clamped[i] = size[i].min(grid[i] - start);
        }
        Ok(Self {
            origin,
            size: clamped,
        })
    }

    /// Global coordinate of the block's first voxel.
    #[must_use]
    pub const fn origin(&self) -> VoxelCoord {
        self.origin
    }

    /// Extents of the block.
    #[must_use]
    pub const fn size(&self) -> [usize; 3] {
        self.size
    }

    /// Number of voxels in the block.
    #[must_use]
    pub const fn voxel_count(&self) -> usize {
        self.size[0] * self.size[1] * self.size[2]
    }

    /// Returns `true` if the global coordinate lies in the block.
    #[must_use]
    pub fn contains(&self, coord: VoxelCoord) -> bool {
        self.to_local(coord).is_some()
    }

    /// Converts a global coordinate to a block-local one.
    #[must_use]
    pub fn to_local(&self, coord: VoxelCoord) -> Option<VoxelCoord> {
        let local = coord.checked_sub(self.origin)?;
        let inside = Axis::ALL.iter().all(|&axis| {
            usize::try_from(local.component(axis)).is_ok_and(|v| v < self.size[axis.index()])
        });
        inside.then_some(local)
    }

    /// Converts a block-local coordinate to a global one.
    #[must_use]
    pub fn to_global(&self, local: VoxelCoord) -> VoxelCoord {
        local + self.origin
    }

    /// Linear index of a global coordinate in a parent grid of `grid` extents.
    ///
    /// The coordinate must lie inside the parent grid.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn global_index(&self, local: VoxelCoord, grid: [usize; 3]) -> usize {
        let global = self.to_global(local);
        linear_index(
            grid,
            global.x as usize,
            global.y as usize,
            global.z as usize,
        )
    }
}
