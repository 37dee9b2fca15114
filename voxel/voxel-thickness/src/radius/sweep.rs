//! Row sweeps of sphere superposition.
//!
//! Every voxel carries a set of sphere centers relevant to it. Sweeping a
//! row along the current axis, each sphere spreads to the positions it still
//! covers, its squared extent shrinking as `ri² - dx²`. The resulting
//! entries become the voxel's set for the next axis; after the last axis the
//! largest covering `R²` is written to the output.
//!
//! Entries are ordered by descending `R²`, then descending extent, and an
//! entry is kept only if its extent exceeds that of every larger sphere.

// Coordinates are below i16::MAX and squared radii below i32::MAX.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use voxel_io::{RiSet, SourceRef};
use voxel_types::{Axis, Block, RowLayout, VoxelGrid, linear_index};

use crate::error::ThicknessResult;
use crate::parallel::{DisjointWriter, ParallelForEach};
use crate::progress::ProgressCounter;
use crate::tables::{CircleFitTable, isqrt_below};

/// A sphere's contribution to one voxel: its squared radius, its squared
/// extent along the next axis, and its center.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RiItem {
    pub(crate) r2: i64,
    pub(crate) ri2: i64,
    pub(crate) source: SourceRef,
}

impl RiItem {
    /// Sort key: larger spheres first, then larger extents.
    fn precedes(&self, other: &Self) -> bool {
        (self.r2, self.ri2) > (other.r2, other.ri2)
    }
}

/// A sphere met earlier in the current sweep, centered at `center`.
#[derive(Debug, Clone, Copy)]
struct ActiveSphere {
    r2: i64,
    ri2: i64,
    center: i64,
    source: SourceRef,
}

impl ActiveSphere {
    fn precedes(&self, other: &Self) -> bool {
        (self.r2, self.ri2) > (other.r2, other.ri2)
    }
}

/// Active sphere of the final sweep, ordered for a max-heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Covering {
    r2: i64,
    ri2: i64,
    center: i64,
}

impl Ord for Covering {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.r2, self.ri2, self.center).cmp(&(other.r2, other.ri2, other.center))
    }
}

impl PartialOrd for Covering {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Merges two sorted lists into `out`; on ties the entry of `second` comes
/// first.
fn merge_sorted<T: Copy>(
    first: &[T],
    second: &[T],
    out: &mut Vec<T>,
    precedes: fn(&T, &T) -> bool,
) {
    out.clear();
    let (mut i, mut j) = (0, 0);
    while i < first.len() && j < second.len() {
        if precedes(&first[i], &second[j]) {
            out.push(first[i]);
            i += 1;
        } else {
            out.push(second[j]);
            j += 1;
        }
    }
    out.extend_from_slice(&first[i..]);
    out.extend_from_slice(&second[j..]);
}

/// Extra filtering of kept entries, depending on how many axes remain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pruning {
    /// Keep every entry with a larger extent.
    None,
    /// Second to last axis: keep entries that widen the discrete span.
    Spans,
    /// Third to last axis: keep entries whose disk is not contained.
    Disks,
}

impl Pruning {
    pub(crate) const fn for_axis(dim: usize, dimensionality: usize) -> Self {
        if dim + 2 == dimensionality {
            Self::Spans
        } else if dim + 3 == dimensionality {
            Self::Disks
        } else {
            Self::None
        }
    }

    fn keeps(self, extent: i64, current: i64, circles: &CircleFitTable) -> bool {
        match self {
            Self::None => true,
            Self::Spans => isqrt_below(extent) > isqrt_below(current),
            Self::Disks => !circles.fits(extent, current),
        }
    }
}

/// Per-worker buffers for one row.
#[derive(Debug, Default)]
pub(crate) struct RowScratch {
    in_row: Vec<Vec<RiItem>>,
    out_row: Vec<Vec<RiItem>>,
    active: Vec<ActiveSphere>,
    active_tmp: Vec<ActiveSphere>,
    incoming: Vec<ActiveSphere>,
    found: Vec<RiItem>,
    merged: Vec<RiItem>,
    heap: BinaryHeap<Covering>,
}

impl RowScratch {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            in_row: vec![Vec::new(); len],
            out_row: vec![Vec::new(); len],
            ..Self::default()
        }
    }
}

/// Position visited at `step` of a sweep over `len` positions.
const fn position(step: usize, len: usize, forward: bool) -> usize {
    if forward { step } else { len - 1 - step }
}

/// One directional sweep producing the entries for the next axis.
fn single_pass(row: &mut RowScratch, forward: bool, pruning: Pruning, circles: &CircleFitTable) {
    let RowScratch {
        in_row,
        out_row,
        active,
        active_tmp,
        incoming,
        found,
        merged,
        ..
    } = row;
    active.clear();
    let len = in_row.len();

    for step in 0..len {
        let x = position(step, len, forward);
        let xi = x as i64;

        incoming.clear();
        incoming.extend(in_row[x].iter().map(|item| ActiveSphere {
            r2: item.r2,
            ri2: item.ri2,
            center: xi,
            source: item.source,
        }));
        merge_sorted(incoming, active, active_tmp, ActiveSphere::precedes);
        std::mem::swap(active, active_tmp);

        found.clear();
        active.retain(|sphere| {
            let dx = xi - sphere.center;
            let extent = sphere.ri2 - dx * dx;
            if extent <= 0 {
                return false;
            }
            let entry = RiItem {
                r2: sphere.r2,
                ri2: extent,
                source: sphere.source,
            };
            match found.last_mut() {
                Some(last) if last.r2 == sphere.r2 => {
                    if last.ri2 < extent {
                        *last = entry;
                    }
                }
                _ => found.push(entry),
            }
            true
        });
        if found.is_empty() {
            continue;
        }

        merge_sorted(&out_row[x], found, merged, RiItem::precedes);
        let kept = &mut out_row[x];
        kept.clear();
        let mut current = merged[0].ri2;
        kept.push(merged[0]);
        for item in &merged[1..] {
            if item.ri2 > current && pruning.keeps(item.ri2, current, circles) {
                kept.push(*item);
                current = item.ri2;
            }
        }
    }
}

/// One directional sweep of the last axis, raising `write(x, r2)` for the
/// largest sphere covering each position.
fn final_pass(row: &mut RowScratch, forward: bool, mut write: impl FnMut(usize, i64)) {
    let RowScratch { in_row, heap, .. } = row;
    heap.clear();
    let len = in_row.len();

    for step in 0..len {
        let x = position(step, len, forward);
        let xi = x as i64;
        heap.extend(in_row[x].iter().map(|item| Covering {
            r2: item.r2,
            ri2: item.ri2,
            center: xi,
        }));
        while let Some(top) = heap.peek() {
            let dx = xi - top.center;
            if top.ri2 - dx * dx > 0 {
                write(x, top.r2);
                break;
            }
            heap.pop();
        }
    }
}

/// Grids touched while sweeping one block along one axis.
pub(crate) struct SweepContext<'a> {
    /// Distance ridge of the whole volume.
    pub(crate) ridge: &'a VoxelGrid<f32>,
    /// Block being swept.
    pub(crate) block: Block,
    /// Dimensionality of the whole volume.
    pub(crate) dimensionality: usize,
    /// Circle-fit table covering the largest ridge value.
    pub(crate) circles: &'a CircleFitTable,
}

impl SweepContext<'_> {
    /// Converts a stored center to an entry for the voxel at block-local
    /// `local`.
    fn to_item(&self, source: SourceRef, local: [usize; 3]) -> RiItem {
        let origin = self.block.origin();
        let z = local[2] + origin.z as usize;
        let value = self.ridge.as_slice()
            [linear_index(self.ridge.dimensions(), source.x as usize, source.y as usize, z)];
        let r2 = f64::from(value).round() as i64;
        let dx = local[0] as i64 - (i64::from(source.x) - i64::from(origin.x));
        let dy = local[1] as i64 - (i64::from(source.y) - i64::from(origin.y));
        RiItem {
            r2,
            ri2: r2 - dx * dx - dy * dy,
            source,
        }
    }
}

/// Block-local coordinate of element `position` of row `row`.
fn local_coord(rows: &RowLayout, row: usize, position: usize) -> [usize; 3] {
    let start = rows.start(row);
    let mut local = [start.x as usize, start.y as usize, start.z as usize];
    local[rows.axis().index()] += position;
    local
}

/// Sweeps every row of a block along `dim`, updating its center sets.
///
/// Must not be called for the last axis; see [`sweep_final_axis`].
pub(crate) fn sweep_axis(
    sets: &mut VoxelGrid<RiSet>,
    dim: usize,
    context: &SweepContext<'_>,
    pool: &ParallelForEach,
    counter: &ProgressCounter<'_>,
) -> ThicknessResult<()> {
    let rows = RowLayout::new(sets.dimensions(), Axis::ALL[dim]);
    let pruning = Pruning::for_axis(dim, context.dimensionality);
    let mut scratch = pool.scratch(|| RowScratch::new(rows.len()));
    let writer = DisjointWriter::new(sets.as_mut_slice());

    pool.for_each_with(0..rows.count(), &mut scratch, |row, buffers| {
        for position in 0..rows.len() {
            let local = local_coord(&rows, row, position);
            // SAFETY: row `row` is touched by exactly one task.
            let stored = unsafe { writer.get(rows.index(row, position)) };
            let items = &mut buffers.in_row[position];
            items.clear();
            items.extend(stored.iter().map(|&source| context.to_item(source, local)));
            buffers.out_row[position].clear();
        }

        single_pass(buffers, true, pruning, context.circles);
        single_pass(buffers, false, pruning, context.circles);

        for position in 0..rows.len() {
            let set: RiSet = buffers.out_row[position].iter().map(|item| item.source).collect();
            // SAFETY: as above.
            unsafe { writer.replace(rows.index(row, position), set) };
        }
        counter.add(1);
        Ok(())
    })
}

/// Sweeps every row of a block along the last axis, raising each voxel of
/// `result` to the largest squared radius covering it.
pub(crate) fn sweep_final_axis(
    sets: &VoxelGrid<RiSet>,
    dim: usize,
    context: &SweepContext<'_>,
    result: &mut VoxelGrid<f32>,
    pool: &ParallelForEach,
    counter: &ProgressCounter<'_>,
) -> ThicknessResult<()> {
    let rows = RowLayout::new(sets.dimensions(), Axis::ALL[dim]);
    let mut scratch = pool.scratch(|| RowScratch::new(rows.len()));
    let grid = result.dimensions();
    let writer = DisjointWriter::new(result.as_mut_slice());

    pool.for_each_with(0..rows.count(), &mut scratch, |row, buffers| {
        for position in 0..rows.len() {
            let local = local_coord(&rows, row, position);
            let stored = &sets.as_slice()[rows.index(row, position)];
            let items = &mut buffers.in_row[position];
            items.clear();
            items.extend(stored.iter().map(|&source| context.to_item(source, local)));
        }

        for forward in [true, false] {
            final_pass(buffers, forward, |position, r2| {
                let local = local_coord(&rows, row, position);
                let index = context.block.global_index(local.map(|c| c as i32).into(), grid);
                // SAFETY: the voxels of row `row` are touched by one task only.
                unsafe {
                    if r2 as f32 > *writer.get(index) {
                        writer.replace(index, r2 as f32);
                    }
                }
            });
        }
        counter.add(1);
        Ok(())
    })
}

/// Center sets of the first axis: every ridge voxel of `block` holds itself.
///
/// # Errors
///
/// Returns [`crate::ThicknessError::Io`] if a coordinate does not fit the
/// stored format.
pub(crate) fn initial_sets(
    ridge: &VoxelGrid<f32>,
    block: &Block,
) -> ThicknessResult<VoxelGrid<RiSet>> {
    let mut sets = VoxelGrid::<RiSet>::with_dimensions(block.size())?;
    let origin = block.origin();
    let dimensions = ridge.dimensions();
    for (index, set) in sets.as_mut_slice().iter_mut().enumerate() {
        let local = linear_to_local(index, block.size());
        let global = [
            local[0] + origin.x as usize,
            local[1] + origin.y as usize,
            local[2] + origin.z as usize,
        ];
        if ridge.as_slice()[linear_index(dimensions, global[0], global[1], global[2])] > 0.0 {
            let source = SourceRef::from_coords(global[0] as i32, global[1] as i32)?;
            *set = Box::new([source]);
        }
    }
    Ok(sets)
}

const fn linear_to_local(index: usize, size: [usize; 3]) -> [usize; 3] {
    let slice = size[0] * size[1];
    [index % size[0], (index % slice) / size[0], index / slice]
}
