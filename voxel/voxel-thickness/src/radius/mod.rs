//! Radius reconstruction by sphere superposition.
//!
//! Every ridge voxel is the center of a maximal inscribed sphere. The local
//! radius of a voxel is the radius of the largest such sphere covering it.
//! Reconstruction sweeps the volume one axis at a time, carrying per voxel
//! the set of sphere centers that may still cover voxels further along; the
//! last axis writes the largest covering squared radius.
//!
//! The per-voxel sets can be much larger than the volume itself. When the
//! estimated working set exceeds the memory budget, each axis is processed
//! in blocks and the sets are handed to the next axis through temporary
//! files (see [`voxel_io::RiBlockFiles`]).

mod blocks;
mod sweep;

use std::path::Path;

use tracing::{debug, info, warn};
use voxel_io::MAX_BLOCK_ID;
use voxel_types::{Axis, Block, RowLayout, VoxelCoord, VoxelGrid};

use crate::error::{ThicknessError, ThicknessResult};
use crate::parallel::ParallelForEach;
use crate::progress::{ProgressCounter, ProgressSink, Stage};
use crate::ridge::max_squared_radius;
use crate::tables::CircleFitTable;

use sweep::{SweepContext, initial_sets, sweep_axis, sweep_final_axis};

/// Bytes of working memory per voxel per unit of mean radius, and the
/// constant part.
const BYTES_PER_RADIUS: f64 = 0.4;
const BYTES_BASE: f64 = 7.0;
const FLOAT_SIZE: f64 = 4.0;

/// Estimated working memory in bytes for reconstructing `voxels` voxels
/// whose ridge spheres have the given mean radius.
///
/// # Example
///
/// ```
/// use voxel_thickness::memory_requirement;
///
/// assert_eq!(memory_requirement(1000, 10.0), (7.0 + 4.0) * 1000.0 * 4.0);
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn memory_requirement(voxels: usize, mean_radius: f64) -> f64 {
    (BYTES_BASE + BYTES_PER_RADIUS * mean_radius) * voxels as f64 * FLOAT_SIZE
}

/// Mean of `sqrt(v)` over the nonzero voxels of `grid`, or 0 if all are 0.
///
/// # Errors
///
/// Returns [`ThicknessError::Interrupted`] if cancelled.
///
/// # Example
///
/// ```
/// use voxel_thickness::{mean_nonzero_radius, ParallelForEach};
/// use voxel_types::VoxelGrid;
///
/// let pool = ParallelForEach::new(Some(2)).unwrap();
/// let grid = VoxelGrid::from_vec([4, 1, 1], vec![0.0, 4.0, 16.0, 0.0]).unwrap();
/// assert_eq!(mean_nonzero_radius(&grid, &pool).unwrap(), 3.0);
/// ```
#[allow(clippy::cast_precision_loss)]
pub fn mean_nonzero_radius(grid: &VoxelGrid<f32>, pool: &ParallelForEach) -> ThicknessResult<f64> {
    let slice_len = grid.width() * grid.height();
    let values = grid.as_slice();
    let mut sums = pool.scratch(|| (0.0f64, 0u64));
    pool.for_each_with(0..grid.depth(), &mut sums, |z, (sum, count)| {
        for &v in &values[z * slice_len..(z + 1) * slice_len] {
            if v != 0.0 {
                *sum += f64::from(v).sqrt();
                *count += 1;
            }
        }
        Ok(())
    })?;
    let (sum, count) = sums
        .into_iter()
        .fold((0.0, 0), |(s, c), (ws, wc)| (s + ws, c + wc));
    Ok(if count > 0 { sum / count as f64 } else { 0.0 })
}

/// Axis along which blocks are cut while sweeping along `dim`.
///
/// Sweeps along X and Y cut along Z, sweeps along Z cut along Y. If that
/// axis has extent 1, the remaining axis is used instead.
#[must_use]
pub fn distribution_axis(dim: usize, dimensions: [usize; 3]) -> Axis {
    let preferred = if dim == 2 { Axis::Y } else { Axis::Z };
    if dimensions[preferred.index()] > 1 {
        return preferred;
    }
    Axis::ALL
        .into_iter()
        .find(|axis| axis.index() != dim && *axis != preferred)
        .unwrap_or(preferred)
}

/// Block partition for one sweep axis.
///
/// # Example
///
/// ```
/// use voxel_thickness::{plan_blocks, memory_requirement};
/// use voxel_types::Axis;
///
/// let dims = [64, 64, 64];
/// let plan = plan_blocks(dims, 0, 2.0, u64::MAX).unwrap();
/// assert!(plan.is_single());
///
/// // A budget of a quarter of the volume needs at least four blocks.
/// let budget = (memory_requirement(64 * 64 * 64, 2.0) / 4.0) as u64;
/// let plan = plan_blocks(dims, 0, 2.0, budget).unwrap();
/// assert_eq!(plan.axis(), Axis::Z);
/// assert!(plan.block_count() >= 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPlan {
    dimensions: [usize; 3],
    axis: Axis,
    block_size: [usize; 3],
    subdivisions: usize,
}

impl BlockPlan {
    /// Axis along which the volume is cut.
    #[must_use]
    pub const fn axis(&self) -> Axis {
        self.axis
    }

    /// Extents of every block except possibly the last one.
    #[must_use]
    pub const fn block_size(&self) -> [usize; 3] {
        self.block_size
    }

    /// Number of subdivisions tried along the cut axis.
    #[must_use]
    pub const fn subdivisions(&self) -> usize {
        self.subdivisions
    }

    /// Returns `true` if one block covers the whole volume.
    #[must_use]
    pub fn is_single(&self) -> bool {
        self.block_size == self.dimensions
    }

    /// Number of blocks.
    #[must_use]
    pub fn block_count(&self) -> usize {
        let a = self.axis.index();
        self.dimensions[a].div_ceil(self.block_size[a])
    }

    /// The blocks, in storage order.
    ///
    /// # Errors
    ///
    /// Returns [`ThicknessError::Voxel`] if the volume is empty.
    pub fn blocks(&self) -> ThicknessResult<Vec<Block>> {
        let a = self.axis.index();
        (0..self.block_count())
            .map(|k| {
                let mut origin = [0i32; 3];
                origin[a] = i32::try_from(k * self.block_size[a]).map_err(|_| {
                    ThicknessError::capacity_exceeded("block origin out of range")
                })?;
                Ok(Block::clamped(
                    VoxelCoord::from(origin),
                    self.block_size,
                    self.dimensions,
                )?)
            })
            .collect()
    }
}

/// Chooses the blocks for sweeping `dim` within `memory_budget` bytes.
///
/// The volume is cut along [`distribution_axis`] into `n` slabs of
/// `extent / n + 1` voxels, with `n` growing until one slab fits the budget.
/// Slabs never get thinner than one voxel; if even that exceeds the budget a
/// warning is logged and the thinnest plan is returned.
///
/// # Errors
///
/// Returns [`ThicknessError::CapacityExceeded`] if more blocks are needed
/// than the block file format can address.
#[allow(clippy::cast_precision_loss)]
pub fn plan_blocks(
    dimensions: [usize; 3],
    dim: usize,
    mean_radius: f64,
    memory_budget: u64,
) -> ThicknessResult<BlockPlan> {
    let axis = distribution_axis(dim, dimensions);
    let a = axis.index();
    let budget = memory_budget as f64;
    let mut plan = BlockPlan {
        dimensions,
        axis,
        block_size: dimensions,
        subdivisions: 1,
    };

    while memory_requirement(plan.block_size.iter().product(), mean_radius) >= budget {
        if plan.block_size[a] <= 1 {
            warn!(
                dim,
                budget = memory_budget,
                "Memory budget too small even for single-voxel blocks"
            );
            break;
        }
        plan.subdivisions += 1;
        plan.block_size[a] = (dimensions[a] / plan.subdivisions + 1).min(dimensions[a]);
    }

    if plan.block_count() > usize::from(MAX_BLOCK_ID) {
        return Err(ThicknessError::capacity_exceeded(format!(
            "{} blocks needed, at most {MAX_BLOCK_ID} supported",
            plan.block_count()
        )));
    }
    Ok(plan)
}

/// How a radius map was reconstructed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReconstructionMode {
    /// All center sets were held in memory.
    SingleBlock,
    /// Sets were handed between axes through temporary files.
    MultiBlock {
        /// Number of blocks used for each sweep axis.
        blocks_per_dimension: Vec<usize>,
    },
}

/// Squared local radius of every voxel, and how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct RadiusMap {
    /// Squared radius of the largest ridge sphere covering each voxel.
    pub squared_radii: VoxelGrid<f32>,
    /// Reconstruction mode.
    pub mode: ReconstructionMode,
}

/// Rejects volumes whose coordinates do not fit the stored center format.
fn check_extents(dimensions: [usize; 3]) -> ThicknessResult<()> {
    let limit = usize::try_from(i16::MAX).unwrap_or(usize::MAX);
    if dimensions.iter().any(|&e| e >= limit) {
        return Err(ThicknessError::capacity_exceeded(format!(
            "volume {dimensions:?} has an extent of {limit} voxels or more"
        )));
    }
    Ok(())
}

fn total_rows(dimensions: [usize; 3], dimensionality: usize) -> u64 {
    Axis::ALL[..dimensionality]
        .iter()
        .map(|&axis| RowLayout::new(dimensions, axis).count() as u64)
        .sum()
}

/// Reconstructs the squared radius map with all center sets in memory.
///
/// # Errors
///
/// Returns [`ThicknessError::CapacityExceeded`] for extents of `i16::MAX`
/// or more and [`ThicknessError::Interrupted`] if cancelled.
pub fn squared_radius_map_single_block(
    ridge: &VoxelGrid<f32>,
    pool: &ParallelForEach,
    progress: &dyn ProgressSink,
) -> ThicknessResult<VoxelGrid<f32>> {
    let dimensions = ridge.dimensions();
    check_extents(dimensions)?;
    let dimensionality = ridge.dimensionality();
    let circles = CircleFitTable::new(max_squared_radius(ridge)?, pool)?;
    let counter = ProgressCounter::new(
        progress,
        Stage::RadiusMap,
        total_rows(dimensions, dimensionality),
    );

    let block = Block::whole(dimensions);
    let context = SweepContext {
        ridge,
        block,
        dimensionality,
        circles: &circles,
    };
    let mut sets = initial_sets(ridge, &block)?;
    let mut result = VoxelGrid::with_dimensions(dimensions)?;
    for dim in 0..dimensionality {
        if dim + 1 < dimensionality {
            sweep_axis(&mut sets, dim, &context, pool, &counter)?;
        } else {
            sweep_final_axis(&sets, dim, &context, &mut result, pool, &counter)?;
        }
        debug!(dim, "Radius sweep complete");
    }
    Ok(result)
}

/// Reconstructs the squared radius map block by block, handing center sets
/// between axes through files in a fresh directory under `temp_dir`.
///
/// Returns the map and the number of blocks used per axis.
///
/// # Errors
///
/// Returns [`ThicknessError::CapacityExceeded`] for extents of `i16::MAX`
/// or more or too many blocks, [`ThicknessError::Io`] if the temporary files
/// cannot be written or read, and [`ThicknessError::Interrupted`] if
/// cancelled.
pub fn squared_radius_map_multi_block(
    ridge: &VoxelGrid<f32>,
    mean_radius: f64,
    memory_budget: u64,
    temp_dir: Option<&Path>,
    pool: &ParallelForEach,
    progress: &dyn ProgressSink,
) -> ThicknessResult<(VoxelGrid<f32>, Vec<usize>)> {
    let dimensions = ridge.dimensions();
    check_extents(dimensions)?;
    let dimensionality = ridge.dimensionality();
    let circles = CircleFitTable::new(max_squared_radius(ridge)?, pool)?;
    let counter = ProgressCounter::new(
        progress,
        Stage::RadiusMap,
        total_rows(dimensions, dimensionality),
    );
    let mut result = VoxelGrid::with_dimensions(dimensions)?;
    let blocks = blocks::reconstruct(
        &blocks::BlockJob {
            ridge,
            mean_radius,
            memory_budget,
            temp_dir,
            circles: &circles,
        },
        &mut result,
        pool,
        &counter,
        progress,
    )?;
    Ok((result, blocks))
}

/// Reconstructs the squared radius map of a distance ridge.
///
/// The volume is processed in memory when its estimated working set fits
/// `memory_budget`, otherwise block by block through temporary files under
/// `temp_dir` (the system temp directory if `None`).
///
/// # Errors
///
/// Returns [`ThicknessError::CapacityExceeded`] for extents of `i16::MAX`
/// or more or too many blocks, [`ThicknessError::Io`] for temporary file
/// failures, and [`ThicknessError::Interrupted`] if cancelled.
///
/// # Example
///
/// ```
/// use voxel_thickness::{squared_radius_map, NoProgress, ParallelForEach, ReconstructionMode};
/// use voxel_types::VoxelGrid;
///
/// let pool = ParallelForEach::new(Some(2)).unwrap();
/// let ridge = VoxelGrid::from_vec([5, 1, 1], vec![0.0, 0.0, 4.0, 0.0, 0.0]).unwrap();
/// let map = squared_radius_map(&ridge, u64::MAX, None, &pool, &NoProgress).unwrap();
/// assert_eq!(map.squared_radii.as_slice(), &[0.0, 4.0, 4.0, 4.0, 0.0]);
/// assert_eq!(map.mode, ReconstructionMode::SingleBlock);
/// ```
pub fn squared_radius_map(
    ridge: &VoxelGrid<f32>,
    memory_budget: u64,
    temp_dir: Option<&Path>,
    pool: &ParallelForEach,
    progress: &dyn ProgressSink,
) -> ThicknessResult<RadiusMap> {
    let mean_radius = mean_nonzero_radius(ridge, pool)?;
    let plan = plan_blocks(ridge.dimensions(), 0, mean_radius, memory_budget)?;
    info!(
        dimensions = ?ridge.dimensions(),
        mean_radius,
        single_block = plan.is_single(),
        "Computing radius map"
    );

    if plan.is_single() {
        let squared_radii = squared_radius_map_single_block(ridge, pool, progress)?;
        return Ok(RadiusMap {
            squared_radii,
            mode: ReconstructionMode::SingleBlock,
        });
    }
    let (squared_radii, blocks_per_dimension) = squared_radius_map_multi_block(
        ridge,
        mean_radius,
        memory_budget,
        temp_dir,
        pool,
        progress,
    )?;
    Ok(RadiusMap {
        squared_radii,
        mode: ReconstructionMode::MultiBlock {
            blocks_per_dimension,
        },
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::distance::squared_distance_map;
    use crate::progress::NoProgress;
    use crate::ridge::distance_ridge;

    fn pool() -> ParallelForEach {
        ParallelForEach::new(Some(3)).unwrap()
    }

    fn ridge_of(dimensions: [usize; 3], seed: u32) -> VoxelGrid<f32> {
        let len: usize = dimensions.iter().product();
        let data: Vec<f32> = (0..len as u32)
            .map(|i| if (i * 41 + seed) % 9 < 2 { 0.0 } else { 1.0 })
            .collect();
        let volume = VoxelGrid::from_vec(dimensions, data).unwrap();
        let dmap = squared_distance_map(volume, 0.0, &pool(), &NoProgress).unwrap();
        distance_ridge(&dmap, None, &pool(), &NoProgress).unwrap()
    }

    /// Largest R² of any ridge sphere strictly covering each voxel.
    fn brute_force(ridge: &VoxelGrid<f32>) -> Vec<f32> {
        let centers: Vec<(VoxelCoord, f32)> = ridge
            .iter()
            .filter(|&(_, &v)| v > 0.0)
            .map(|(c, &v)| (c, v))
            .collect();
        ridge
            .iter()
            .map(|(p, _)| {
                centers
                    .iter()
                    .filter(|(c, r2)| {
                        let d = p - *c;
                        ((d.x * d.x + d.y * d.y + d.z * d.z) as f32) < *r2
                    })
                    .fold(0.0f32, |m, &(_, r2)| m.max(r2))
            })
            .collect()
    }

    #[test]
    fn test_ball_is_filled_with_its_radius() {
        let (n, c, r) = (11usize, 5, 4);
        let mut volume = VoxelGrid::<f32>::new(n, n, n).unwrap();
        let coords: Vec<VoxelCoord> = (0..volume.len()).map(|i| volume.coord_of(i)).collect();
        for &coord in &coords {
            let d = coord - VoxelCoord::new(c, c, c);
            if d.x * d.x + d.y * d.y + d.z * d.z < r * r {
                volume.set(coord, 1.0).unwrap();
            }
        }
        let dmap = squared_distance_map(volume, 0.0, &pool(), &NoProgress).unwrap();
        let ridge = distance_ridge(&dmap, None, &pool(), &NoProgress).unwrap();
        let map = squared_radius_map_single_block(&ridge, &pool(), &NoProgress).unwrap();
        for &coord in &coords {
            let d = coord - VoxelCoord::new(c, c, c);
            let inside = d.x * d.x + d.y * d.y + d.z * d.z < r * r;
            let expected = if inside { 16.0 } else { 0.0 };
            assert_eq!(map.get(coord), Some(&expected), "at {coord:?}");
        }
    }

    #[test]
    fn test_matches_brute_force() {
        for (dimensions, seed) in [([7, 1, 1], 1), ([9, 8, 1], 2), ([6, 7, 5], 3), ([10, 9, 8], 4)] {
            let ridge = ridge_of(dimensions, seed);
            let map = squared_radius_map_single_block(&ridge, &pool(), &NoProgress).unwrap();
            assert_eq!(map.as_slice(), brute_force(&ridge).as_slice(), "{dimensions:?}");
        }
    }

    #[test]
    fn test_multi_block_matches_single_block() {
        let dir = tempfile::tempdir().unwrap();
        for (dimensions, seed) in [([9, 8, 7], 5), ([12, 10, 1], 6), ([5, 6, 9], 7)] {
            let ridge = ridge_of(dimensions, seed);
            let single = squared_radius_map_single_block(&ridge, &pool(), &NoProgress).unwrap();
            let mean = mean_nonzero_radius(&ridge, &pool()).unwrap();
            let budget = (memory_requirement(ridge.len(), mean) / 3.0) as u64;
            let map = squared_radius_map(&ridge, budget, Some(dir.path()), &pool(), &NoProgress)
                .unwrap();
            match &map.mode {
                ReconstructionMode::MultiBlock {
                    blocks_per_dimension,
                } => {
                    assert_eq!(blocks_per_dimension.len(), ridge.dimensionality());
                    assert!(blocks_per_dimension.iter().all(|&b| b >= 3));
                }
                ReconstructionMode::SingleBlock => panic!("expected blocks for {dimensions:?}"),
            }
            assert_eq!(map.squared_radii, single, "{dimensions:?}");
        }
        // Temporary files are gone once reconstruction returns.
        let root = dir.path().join(voxel_io::TEMP_ROOT_NAME);
        assert!(!root.exists() || std::fs::read_dir(&root).unwrap().next().is_none());
    }

    #[test]
    fn test_isolated_voxel_radius() {
        let mut volume = VoxelGrid::<f32>::new(3, 3, 3).unwrap();
        volume.set(VoxelCoord::new(1, 1, 1), 1.0).unwrap();
        let dmap = squared_distance_map(volume, 0.0, &pool(), &NoProgress).unwrap();
        let ridge = distance_ridge(&dmap, None, &pool(), &NoProgress).unwrap();
        let map = squared_radius_map(&ridge, u64::MAX, None, &pool(), &NoProgress).unwrap();
        let nonzero: Vec<_> = map.squared_radii.iter().filter(|&(_, &v)| v != 0.0).collect();
        assert_eq!(nonzero, vec![(VoxelCoord::new(1, 1, 1), &1.0)]);
    }

    #[test]
    fn test_mean_radius_of_empty_grid() {
        let grid = VoxelGrid::<f32>::new(3, 2, 2).unwrap();
        assert_eq!(mean_nonzero_radius(&grid, &pool()).unwrap(), 0.0);
    }

    #[test]
    fn test_distribution_axis() {
        assert_eq!(distribution_axis(0, [8, 8, 8]), Axis::Z);
        assert_eq!(distribution_axis(1, [8, 8, 8]), Axis::Z);
        assert_eq!(distribution_axis(2, [8, 8, 8]), Axis::Y);
        // Flat volumes fall back to the remaining axis.
        assert_eq!(distribution_axis(0, [8, 8, 1]), Axis::Y);
        assert_eq!(distribution_axis(1, [8, 8, 1]), Axis::X);
    }

    #[test]
    fn test_plan_block_sizes() {
        let dims = [10, 10, 10];
        let full = memory_requirement(1000, 1.0);
        let plan = plan_blocks(dims, 0, 1.0, (full * 0.7) as u64).unwrap();
        assert_eq!(plan.subdivisions(), 2);
        assert_eq!(plan.block_size(), [10, 10, 6]);
        let blocks = plan.blocks().unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1].origin(), VoxelCoord::new(0, 0, 6));
        assert_eq!(blocks[1].size(), [10, 10, 4]);
    }

    #[test]
    fn test_plan_floor_at_single_voxel() {
        let plan = plan_blocks([4, 4, 5], 2, 1.0, 1).unwrap();
        assert_eq!(plan.axis(), Axis::Y);
        assert_eq!(plan.block_size(), [4, 1, 5]);
        assert_eq!(plan.block_count(), 4);
    }

    #[test]
    fn test_too_many_blocks() {
        let result = plan_blocks([2, 2, 40_000], 0, 1.0, 1);
        assert!(matches!(result, Err(ThicknessError::CapacityExceeded(_))));
    }

    #[test]
    fn test_extent_limit() {
        let ridge = VoxelGrid::<f32>::new(40_000, 1, 1).unwrap();
        let result = squared_radius_map_single_block(&ridge, &pool(), &NoProgress);
        assert!(matches!(result, Err(ThicknessError::CapacityExceeded(_))));
    }
}
