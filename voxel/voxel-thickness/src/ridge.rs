//! Distance ridge extraction.
//!
//! A foreground voxel of the squared distance map is the center of the
//! largest sphere that fits in the structure at that point. The ridge keeps
//! only the voxels whose sphere is not contained in the sphere of any of their
//! 26 neighbors; every other voxel becomes 0.
//!
//! Containment is decided with [`DanielssonTables`]: a neighbor with rounded
//! value `v` in offset class `k` dominates a voxel with rounded value `c` when
//! `table_k[v] >= c`.

// Squared distances are integers below 2^31; the casts are exact.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::float_cmp
)]

use std::path::Path;

use tracing::{debug, info};
use voxel_types::{Axis, RowLayout, VoxelGrid};

use crate::distance::UNREACHED;
use crate::error::{ThicknessError, ThicknessResult};
use crate::parallel::ParallelForEach;
use crate::progress::{ProgressCounter, ProgressSink, Stage};
use crate::tables::{DanielssonTables, NeighborClass};

/// Rounded squared distance of a voxel value; unreached voxels count as 0.
fn rounded(value: f32) -> i64 {
    if value == UNREACHED {
        0
    } else {
        value.round() as i64
    }
}

/// Largest rounded value of `grid`, ignoring unreached voxels.
///
/// # Errors
///
/// Returns [`ThicknessError::CapacityExceeded`] if the maximum does not fit
/// in an `i32`.
///
/// # Example
///
/// ```
/// use voxel_thickness::{max_squared_radius, UNREACHED};
/// use voxel_types::VoxelGrid;
///
/// let grid = VoxelGrid::from_vec([3, 1, 1], vec![4.2, UNREACHED, 9.0]).unwrap();
/// assert_eq!(max_squared_radius(&grid).unwrap(), 9);
/// ```
pub fn max_squared_radius(grid: &VoxelGrid<f32>) -> ThicknessResult<i64> {
    let max = grid
        .as_slice()
        .iter()
        .filter(|&&v| v != UNREACHED)
        .fold(0.0f32, |m, &v| m.max(v));
    let max = f64::from(max).round();
    if max >= f64::from(i32::MAX) {
        return Err(ThicknessError::capacity_exceeded(format!(
            "squared distance {max} exceeds the supported range"
        )));
    }
    Ok(max as i64)
}

/// Offsets of the 26-neighborhood with their classes.
fn neighborhood() -> Vec<([i64; 3], NeighborClass)> {
    let mut offsets = Vec::with_capacity(26);
    for dz in -1..=1 {
        for dy in -1..=1 {
            for dx in -1..=1 {
                if let Some(class) = NeighborClass::of_offset(dx, dy, dz) {
                    offsets.push(([i64::from(dx), i64::from(dy), i64::from(dz)], class));
                }
            }
        }
    }
    offsets
}

/// Extracts the distance ridge of a squared distance map using precomputed
/// tables.
///
/// Returns a new grid holding the rounded squared distance at ridge voxels
/// and 0 elsewhere. Unreached voxels are never ridge voxels.
///
/// # Errors
///
/// Returns [`ThicknessError::InvalidArgument`] if `tables` do not cover the
/// largest value of `dmap`, and [`ThicknessError::Interrupted`] if cancelled.
pub fn squared_distance_ridge(
    dmap: &VoxelGrid<f32>,
    tables: &DanielssonTables,
    pool: &ParallelForEach,
    progress: &dyn ProgressSink,
) -> ThicknessResult<VoxelGrid<f32>> {
    let max_r2 = max_squared_radius(dmap)?;
    if !tables.covers(max_r2) {
        return Err(ThicknessError::invalid_argument(format!(
            "ridge tables cover {} values, need {}",
            tables.len(),
            max_r2 + 1
        )));
    }

    let dimensions = dmap.dimensions();
    let extents = dimensions.map(|e| e as i64);
    let rows = RowLayout::new(dimensions, Axis::X);
    let offsets = neighborhood();
    let values = dmap.as_slice();
    let value_at = |x: i64, y: i64, z: i64| -> i64 {
        let inside = (0..extents[0]).contains(&x)
            && (0..extents[1]).contains(&y)
            && (0..extents[2]).contains(&z);
        if inside {
            rounded(values[((z * extents[1] + y) * extents[0] + x) as usize])
        } else {
            0
        }
    };

    let mut ridge = VoxelGrid::<f32>::with_dimensions(dimensions)?;
    let counter = ProgressCounter::new(progress, Stage::DistanceRidge, rows.count() as u64);
    pool.for_each_chunk_mut(ridge.as_mut_slice(), dimensions[0], |row, out| {
        let start = rows.start(row);
        let (y, z) = (i64::from(start.y), i64::from(start.z));
        for (x, slot) in (0..extents[0]).zip(out.iter_mut()) {
            let c = value_at(x, y, z);
            if c == 0 {
                continue;
            }
            let dominated = offsets.iter().any(|&([dx, dy, dz], class)| {
                tables.lookup(class, value_at(x + dx, y + dy, z + dz)) >= c
            });
            if !dominated {
                *slot = c as f32;
            }
        }
        counter.add(1);
        Ok(())
    })?;

    let survivors = ridge.as_slice().iter().filter(|&&v| v != 0.0).count();
    debug!(survivors, max_r2, "Extracted distance ridge");
    Ok(ridge)
}

/// Computes the distance ridge of a squared distance map.
///
/// The tables are loaded from `cache_dir` when it holds large enough ones,
/// otherwise they are computed (and cached when `cache_dir` is given).
///
/// # Errors
///
/// Returns [`ThicknessError::CapacityExceeded`] if the map holds values
/// beyond the table range, and [`ThicknessError::Interrupted`] if cancelled.
///
/// # Example
///
/// ```
/// use voxel_thickness::{distance_ridge, NoProgress, ParallelForEach};
/// use voxel_types::VoxelGrid;
///
/// let pool = ParallelForEach::new(Some(2)).unwrap();
/// let dmap = VoxelGrid::from_vec([5, 1, 1], vec![0.0, 1.0, 4.0, 1.0, 0.0]).unwrap();
/// let ridge = distance_ridge(&dmap, None, &pool, &NoProgress).unwrap();
/// assert_eq!(ridge.as_slice(), &[0.0, 0.0, 4.0, 0.0, 0.0]);
/// ```
pub fn distance_ridge(
    dmap: &VoxelGrid<f32>,
    cache_dir: Option<&Path>,
    pool: &ParallelForEach,
    progress: &dyn ProgressSink,
) -> ThicknessResult<VoxelGrid<f32>> {
    let max_r2 = max_squared_radius(dmap)?;
    info!(
        dimensions = ?dmap.dimensions(),
        max_r2,
        "Computing distance ridge"
    );
    let tables = DanielssonTables::obtain(max_r2, cache_dir, pool, progress)?;
    squared_distance_ridge(dmap, &tables, pool, progress)
}
