//! Exact squared Euclidean distance transform.
//!
//! The transform is separable: one pass of 1D lower-envelope computation per
//! axis, each pass reading the previous pass's output. Along a row, every
//! reached voxel defines a parabola `f(i) + (x - i)^2`; the pass keeps only
//! the parabolas that form the lower envelope and then evaluates it at every
//! position.
//!
//! Voxels that cannot reach any background voxel keep the [`UNREACHED`]
//! sentinel, which only happens when the whole volume is foreground.

// Row positions are bounded by grid extents (< 2^31); f64 holds them exactly.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::float_cmp
)]

use tracing::{debug, info};
use voxel_types::{Axis, RowLayout, VoxelGrid};

use crate::error::ThicknessResult;
use crate::parallel::{DisjointWriter, ParallelForEach};
use crate::progress::{ProgressCounter, ProgressSink, Stage};

/// Distance value of background voxels.
pub const BACKGROUND: f32 = 0.0;

/// Squared distance of voxels that have not reached any background voxel.
pub const UNREACHED: f32 = f32::MAX;

/// Marks voxels equal to `background_value` as background (0) and all
/// others as unreached.
///
/// # Example
///
/// ```
/// use voxel_thickness::{prepare, UNREACHED};
/// use voxel_types::VoxelGrid;
///
/// let mut grid = VoxelGrid::from_u8([3, 1, 1], &[255, 0, 255]).unwrap();
/// prepare(&mut grid, 255.0);
/// assert_eq!(grid.as_slice(), &[0.0, UNREACHED, 0.0]);
/// ```
pub fn prepare(grid: &mut VoxelGrid<f32>, background_value: f32) {
    for value in grid.as_mut_slice() {
        *value = if *value == background_value {
            BACKGROUND
        } else {
            UNREACHED
        };
    }
}

/// Reusable buffers for one row of the lower-envelope pass.
struct EnvelopeScratch {
    values: Vec<f32>,
    heights: Vec<f64>,
    positions: Vec<f64>,
}

impl EnvelopeScratch {
    fn new(len: usize) -> Self {
        Self {
            values: vec![0.0; len],
            heights: Vec::with_capacity(len),
            positions: Vec::with_capacity(len),
        }
    }
}

/// Returns `true` if the middle parabola `v` is hidden by `u` and `w`.
fn is_dominated(du: f64, dv: f64, dw: f64, u: f64, v: f64, w: f64) -> bool {
    let a = v - u;
    let b = w - v;
    let c = w - u;
    c * dv - b * du - a * dw - a * b * c > 0.0
}

/// Replaces each value of `scratch.values` by the lower envelope of the
/// parabolas rooted at its reached entries.
fn envelope_row(scratch: &mut EnvelopeScratch) {
    let EnvelopeScratch {
        values,
        heights,
        positions,
    } = scratch;
    heights.clear();
    positions.clear();

    for (i, &value) in values.iter().enumerate() {
        if value == UNREACHED {
            continue;
        }
        let (fi, xi) = (f64::from(value), i as f64);
        while let [.., du, dv] = heights[..] {
            let l = positions.len();
            if !is_dominated(du, dv, fi, positions[l - 2], positions[l - 1], xi) {
                break;
            }
            heights.pop();
            positions.pop();
        }
        heights.push(fi);
        positions.push(xi);
    }
    if heights.is_empty() {
        return;
    }

    let mut l = 0;
    for (i, value) in values.iter_mut().enumerate() {
        let xi = i as f64;
        let at = |k: usize| heights[k] + (positions[k] - xi) * (positions[k] - xi);
        while l + 1 < heights.len() && at(l) > at(l + 1) {
            l += 1;
        }
        *value = at(l) as f32;
    }
}

/// Runs the distance transform in place on a prepared grid.
///
/// Passes run along X, then Y, then Z, up to the grid's dimensionality.
///
/// # Errors
///
/// Returns [`crate::ThicknessError::Interrupted`] if cancelled.
pub fn squared_distance_transform(
    grid: &mut VoxelGrid<f32>,
    pool: &ParallelForEach,
    progress: &dyn ProgressSink,
) -> ThicknessResult<()> {
    let dimensionality = grid.dimensionality();
    let total: usize = Axis::ALL[..dimensionality]
        .iter()
        .map(|&axis| grid.rows(axis).count())
        .sum();
    let counter = ProgressCounter::new(progress, Stage::DistanceMap, total as u64);

    for &axis in &Axis::ALL[..dimensionality] {
        let rows = grid.rows(axis);
        if axis == Axis::X {
            contiguous_pass(grid, pool, &counter)?;
        } else {
            strided_pass(grid, rows, pool, &counter)?;
        }
        debug!(axis = ?axis, rows = rows.count(), "Distance pass complete");
    }
    Ok(())
}

/// X pass: rows are contiguous, so each task takes a run of whole rows.
fn contiguous_pass(
    grid: &mut VoxelGrid<f32>,
    pool: &ParallelForEach,
    counter: &ProgressCounter<'_>,
) -> ThicknessResult<()> {
    let width = grid.width();
    let row_count = grid.len() / width;
    let rows_per_task = row_count.div_ceil(pool.workers().min(row_count));
    pool.for_each_chunk_mut(grid.as_mut_slice(), rows_per_task * width, |_, run| {
        let mut scratch = EnvelopeScratch::new(width);
        for row in run.chunks_mut(width) {
            pool.check_interrupt()?;
            scratch.values.copy_from_slice(row);
            envelope_row(&mut scratch);
            row.copy_from_slice(&scratch.values);
            counter.add(1);
        }
        Ok(())
    })
}

/// Y and Z passes: row elements are a row or a slice apart.
fn strided_pass(
    grid: &mut VoxelGrid<f32>,
    rows: RowLayout,
    pool: &ParallelForEach,
    counter: &ProgressCounter<'_>,
) -> ThicknessResult<()> {
    let mut states = pool.scratch(|| EnvelopeScratch::new(rows.len()));
    let writer = DisjointWriter::new(grid.as_mut_slice());
    pool.for_each_with(0..rows.count(), &mut states, |row, scratch| {
        for position in 0..rows.len() {
            // SAFETY: row `row` is visited by exactly one task.
            scratch.values[position] = unsafe { *writer.get(rows.index(row, position)) };
        }
        envelope_row(scratch);
        for position in 0..rows.len() {
            // SAFETY: as above.
            unsafe { writer.replace(rows.index(row, position), scratch.values[position]) };
        }
        counter.add(1);
        Ok(())
    })
}

/// Computes the squared distance map of `volume`.
///
/// Background voxels map to 0; every foreground voxel maps to the squared
/// Euclidean distance to its nearest background voxel.
///
/// # Errors
///
/// Returns [`crate::ThicknessError::Interrupted`] if cancelled.
///
/// # Example
///
/// ```
/// use voxel_thickness::{squared_distance_map, NoProgress, ParallelForEach};
/// use voxel_types::VoxelGrid;
///
/// let pool = ParallelForEach::new(Some(2)).unwrap();
/// let volume = VoxelGrid::from_u8([5, 1, 1], &[0, 1, 1, 1, 0]).unwrap();
/// let dmap = squared_distance_map(volume, 0.0, &pool, &NoProgress).unwrap();
/// assert_eq!(dmap.as_slice(), &[0.0, 1.0, 4.0, 1.0, 0.0]);
/// ```
pub fn squared_distance_map(
    mut volume: VoxelGrid<f32>,
    background_value: f32,
    pool: &ParallelForEach,
    progress: &dyn ProgressSink,
) -> ThicknessResult<VoxelGrid<f32>> {
    info!(
        dimensions = ?volume.dimensions(),
        background_value,
        "Computing squared distance map"
    );
    prepare(&mut volume, background_value);
    squared_distance_transform(&mut volume, pool, progress)?;
    Ok(volume)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use voxel_types::VoxelCoord;

    fn pool() -> ParallelForEach {
        ParallelForEach::new(Some(3)).unwrap()
    }

    fn brute_force(volume: &VoxelGrid<f32>) -> Vec<f32> {
        let background: Vec<VoxelCoord> = volume
            .iter()
            .filter(|&(_, &v)| v == 0.0)
            .map(|(c, _)| c)
            .collect();
        volume
            .iter()
            .map(|(c, _)| {
                background
                    .iter()
                    .map(|b| {
                        let d = c - *b;
                        (d.x * d.x + d.y * d.y + d.z * d.z) as f32
                    })
                    .fold(UNREACHED, f32::min)
            })
            .collect()
    }

    #[test]
    fn test_single_background_corner() {
        let mut volume = VoxelGrid::filled(5, 5, 5, 1.0f32).unwrap();
        volume.set(VoxelCoord::origin(), 0.0).unwrap();
        let dmap = squared_distance_map(volume, 0.0, &pool(), &NoProgress).unwrap();

        assert_eq!(dmap.get(VoxelCoord::new(4, 4, 4)), Some(&48.0));
        for (coord, &value) in dmap.iter() {
            let expected = coord.x * coord.x + coord.y * coord.y + coord.z * coord.z;
            assert_eq!(value, expected as f32, "at {coord:?}");
        }
    }

    #[test]
    fn test_all_foreground_stays_unreached() {
        let volume = VoxelGrid::filled(6, 1, 1, 7.0f32).unwrap();
        let dmap = squared_distance_map(volume, 0.0, &pool(), &NoProgress).unwrap();
        assert!(dmap.as_slice().iter().all(|&v| v == UNREACHED));
    }

    #[test]
    fn test_all_background_is_zero() {
        let volume = VoxelGrid::filled(4, 3, 2, 0.0f32).unwrap();
        let dmap = squared_distance_map(volume, 0.0, &pool(), &NoProgress).unwrap();
        assert!(dmap.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_custom_background_value() {
        let volume = VoxelGrid::from_u8([4, 1, 1], &[9, 3, 3, 9]).unwrap();
        let dmap = squared_distance_map(volume, 9.0, &pool(), &NoProgress).unwrap();
        assert_eq!(dmap.as_slice(), &[0.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_matches_brute_force_2d() {
        // Deterministic scatter of background pixels in a 9x7 image.
        let data: Vec<f32> = (0..63u32)
            .map(|i| if (i * 37 + 11) % 13 < 2 { 0.0 } else { 1.0 })
            .collect();
        let volume = VoxelGrid::from_vec([9, 7, 1], data).unwrap();
        let expected = brute_force(&volume);
        let dmap = squared_distance_map(volume, 0.0, &pool(), &NoProgress).unwrap();
        assert_eq!(dmap.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_matches_brute_force_3d() {
        let data: Vec<f32> = (0..(6 * 5 * 4u32))
            .map(|i| if (i * 53 + 7) % 17 < 2 { 0.0 } else { 1.0 })
            .collect();
        let volume = VoxelGrid::from_vec([6, 5, 4], data).unwrap();
        let expected = brute_force(&volume);
        let dmap = squared_distance_map(volume, 0.0, &pool(), &NoProgress).unwrap();
        assert_eq!(dmap.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_worker_count_does_not_matter() {
        let data: Vec<f32> = (0..(8 * 8 * 3u32))
            .map(|i| if i % 11 == 0 { 0.0 } else { 1.0 })
            .collect();
        let volume = VoxelGrid::from_vec([8, 8, 3], data).unwrap();
        let one = ParallelForEach::new(Some(1)).unwrap();
        let many = ParallelForEach::new(Some(5)).unwrap();
        let a = squared_distance_map(volume.clone(), 0.0, &one, &NoProgress).unwrap();
        let b = squared_distance_map(volume, 0.0, &many, &NoProgress).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_voxel_grid() {
        let volume = VoxelGrid::filled(1, 1, 1, 1.0f32).unwrap();
        let dmap = squared_distance_map(volume, 0.0, &pool(), &NoProgress).unwrap();
        assert_eq!(dmap.as_slice(), &[UNREACHED]);
    }

    #[test]
    fn test_dominance_predicate() {
        // Parabolas at 0 and 4 with height 0 hide a tall one at 2.
        assert!(is_dominated(0.0, 9.0, 0.0, 0.0, 2.0, 4.0));
        assert!(!is_dominated(0.0, 0.0, 0.0, 0.0, 2.0, 4.0));
    }
}
