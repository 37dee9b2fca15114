//! Voxel-wise stages: ridge rounding and conversion to diameters.

use tracing::debug;
use voxel_types::VoxelGrid;

use crate::error::ThicknessResult;
use crate::parallel::ParallelForEach;
use crate::progress::{ProgressCounter, ProgressSink, Stage};

/// Applies `f` to every voxel, one XY slice per task.
fn update_slices<F>(
    grid: &mut VoxelGrid<f32>,
    pool: &ParallelForEach,
    counter: &ProgressCounter<'_>,
    f: F,
) -> ThicknessResult<()>
where
    F: Fn(f32) -> f32 + Sync,
{
    let slice_len = grid.width() * grid.height();
    pool.for_each_chunk_mut(grid.as_mut_slice(), slice_len, |_, slice| {
        for v in slice.iter_mut() {
            *v = f(*v);
        }
        counter.add(1);
        Ok(())
    })
}

/// Replaces each squared radius `v` by `round(sqrt(v))²`.
///
/// Applied to the distance ridge, this makes every sphere radius an integer
/// before reconstruction.
///
/// # Errors
///
/// Returns [`crate::ThicknessError::Interrupted`] if cancelled.
///
/// # Example
///
/// ```
/// use voxel_thickness::{round_to_integer_radii, NoProgress, ParallelForEach};
/// use voxel_types::VoxelGrid;
///
/// let pool = ParallelForEach::new(Some(2)).unwrap();
/// let mut ridge = VoxelGrid::from_vec([4, 1, 1], vec![0.0, 2.0, 3.0, 12.0]).unwrap();
/// round_to_integer_radii(&mut ridge, &pool, &NoProgress).unwrap();
/// assert_eq!(ridge.as_slice(), &[0.0, 1.0, 4.0, 9.0]);
/// ```
pub fn round_to_integer_radii(
    ridge: &mut VoxelGrid<f32>,
    pool: &ParallelForEach,
    progress: &dyn ProgressSink,
) -> ThicknessResult<()> {
    let counter = ProgressCounter::new(progress, Stage::RidgeRounding, ridge.depth() as u64);
    update_slices(ridge, pool, &counter, |v| {
        let r = v.sqrt().round();
        r * r
    })?;
    debug!("Rounded ridge to integer radii");
    Ok(())
}

/// Replaces each squared radius `r²` by the diameter `2r`.
///
/// # Errors
///
/// Returns [`crate::ThicknessError::Interrupted`] if cancelled.
///
/// # Example
///
/// ```
/// use voxel_thickness::{squared_radius_to_diameter, NoProgress, ParallelForEach};
/// use voxel_types::VoxelGrid;
///
/// let pool = ParallelForEach::new(Some(2)).unwrap();
/// let mut grid = VoxelGrid::from_vec([3, 1, 1], vec![0.0, 1.0, 16.0]).unwrap();
/// squared_radius_to_diameter(&mut grid, &pool, &NoProgress).unwrap();
/// assert_eq!(grid.as_slice(), &[0.0, 2.0, 8.0]);
/// ```
pub fn squared_radius_to_diameter(
    grid: &mut VoxelGrid<f32>,
    pool: &ParallelForEach,
    progress: &dyn ProgressSink,
) -> ThicknessResult<()> {
    let counter = ProgressCounter::new(progress, Stage::Finalize, grid.depth() as u64);
    update_slices(grid, pool, &counter, |v| 2.0 * v.sqrt())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::progress::tests::RecordingSink;
    use approx::assert_relative_eq;

    fn pool() -> ParallelForEach {
        ParallelForEach::new(Some(2)).unwrap()
    }

    #[test]
    fn test_rounding_keeps_perfect_squares() {
        let values: Vec<f32> = (0..20).map(|r| (r * r) as f32).collect();
        let mut grid = VoxelGrid::from_vec([5, 2, 2], values.clone()).unwrap();
        round_to_integer_radii(&mut grid, &pool(), &NoProgress).unwrap();
        assert_eq!(grid.as_slice(), values.as_slice());
    }

    #[test]
    fn test_diameter_of_non_square() {
        let mut grid = VoxelGrid::from_vec([2, 1, 1], vec![2.0, 5.0]).unwrap();
        squared_radius_to_diameter(&mut grid, &pool(), &NoProgress).unwrap();
        assert_relative_eq!(grid.as_slice()[0], 2.0 * 2f32.sqrt());
        assert_relative_eq!(grid.as_slice()[1], 2.0 * 5f32.sqrt());
    }

    #[test]
    fn test_progress_per_slice() {
        let sink = RecordingSink::default();
        let mut grid = VoxelGrid::<f32>::new(2, 2, 3).unwrap();
        squared_radius_to_diameter(&mut grid, &pool(), &sink).unwrap();
        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.first(), Some(&(Stage::Finalize, 0, 3)));
        assert_eq!(reports.len(), 4);
        assert!(reports.iter().any(|&(_, done, _)| done == 3));
    }
}
