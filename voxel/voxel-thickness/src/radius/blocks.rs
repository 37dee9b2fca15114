//! Out-of-core reconstruction.
//!
//! Each axis is swept block by block. The center sets a block produces are
//! written to the files of that axis and read back, cut along a different
//! axis, by the next one. The files of an axis are deleted as soon as the
//! next axis is done with them.

use std::path::Path;

use tracing::{debug, info};
use voxel_io::TempWorkspace;
use voxel_types::VoxelGrid;

use super::plan_blocks;
use super::sweep::{SweepContext, initial_sets, sweep_axis, sweep_final_axis};
use crate::error::{ThicknessError, ThicknessResult};
use crate::parallel::ParallelForEach;
use crate::progress::{ProgressCounter, ProgressSink};
use crate::tables::CircleFitTable;

/// Inputs shared by every block of a reconstruction.
pub(super) struct BlockJob<'a> {
    pub(super) ridge: &'a VoxelGrid<f32>,
    pub(super) mean_radius: f64,
    pub(super) memory_budget: u64,
    pub(super) temp_dir: Option<&'a Path>,
    pub(super) circles: &'a CircleFitTable,
}

/// Runs every sweep block by block, writing the covering radii into
/// `result`. Returns the number of blocks used per axis.
pub(super) fn reconstruct(
    job: &BlockJob<'_>,
    result: &mut VoxelGrid<f32>,
    pool: &ParallelForEach,
    counter: &ProgressCounter<'_>,
    progress: &dyn ProgressSink,
) -> ThicknessResult<Vec<usize>> {
    let dimensions = job.ridge.dimensions();
    let dimensionality = job.ridge.dimensionality();
    let workspace = TempWorkspace::create(job.temp_dir)?;
    let mut blocks_per_dimension = Vec::with_capacity(dimensionality);

    for dim in 0..dimensionality {
        let plan = plan_blocks(dimensions, dim, job.mean_radius, job.memory_budget)?;
        let blocks = plan.blocks()?;
        info!(
            dim,
            blocks = blocks.len(),
            block_size = ?plan.block_size(),
            axis = ?plan.axis(),
            "Sweeping in blocks"
        );

        let previous = (dim > 0).then(|| workspace.dimension_files(dim - 1, dimensions));
        let output = workspace.dimension_files(dim, dimensions);
        let last = dim + 1 == dimensionality;

        for (n, block) in blocks.iter().enumerate() {
            pool.check_interrupt()?;
            progress.status(&format!(
                "Dimension {} block {} / {}",
                dim + 1,
                n + 1,
                blocks.len()
            ));
            let mut sets = match &previous {
                Some(files) => files.read_block(block)?,
                None => initial_sets(job.ridge, block)?,
            };
            let context = SweepContext {
                ridge: job.ridge,
                block: *block,
                dimensionality,
                circles: job.circles,
            };
            if last {
                sweep_final_axis(&sets, dim, &context, result, pool, counter)?;
            } else {
                sweep_axis(&mut sets, dim, &context, pool, counter)?;
                let id = u16::try_from(n).map_err(|_| {
                    ThicknessError::capacity_exceeded(format!("block id {n} out of range"))
                })?;
                output.write_block(id, block, &sets)?;
            }
            debug!(dim, block = n, origin = ?block.origin(), "Block swept");
        }

        if dim > 0 {
            let leftover = workspace.remove_dimension(dim - 1, dimensions);
            debug!(dim, leftover, "Released previous dimension files");
        }
        blocks_per_dimension.push(blocks.len());
    }
    Ok(blocks_per_dimension)
}
