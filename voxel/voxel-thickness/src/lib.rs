//! Local thickness of voxel volumes.
//!
//! The local thickness of a foreground voxel is the diameter of the largest
//! sphere that fits inside the structure and contains the voxel. This crate
//! computes it for 1-D, 2-D and 3-D volumes of arbitrary size, falling back
//! to block-wise processing through temporary files when the working set
//! exceeds a memory budget.
//!
//! # Algorithm
//!
//! 1. **Distance map**: separable squared Euclidean distance transform of
//!    the foreground ([`squared_distance_map`]).
//! 2. **Distance ridge**: keep the voxels whose inscribed sphere is not
//!    contained in a neighbor's ([`distance_ridge`]), decided with
//!    precomputed [`DanielssonTables`] that can be cached on disk.
//! 3. **Radius map**: every voxel takes the largest ridge sphere covering it
//!    ([`squared_radius_map`]), swept axis by axis.
//! 4. **Diameters**: `2 * sqrt(r²)` ([`squared_radius_to_diameter`]).
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**. Parallel loops
//! run on a private rayon pool ([`ParallelForEach`]).
//!
//! # Example
//!
//! ```
//! use voxel_thickness::{compute_thickness_map, ThicknessParams};
//! use voxel_types::VoxelGrid;
//!
//! // A 4x4 square in an 8x8 image.
//! let mut image = VoxelGrid::<f32>::new(8, 8, 1).unwrap();
//! for (i, v) in image.as_mut_slice().iter_mut().enumerate() {
//!     let (x, y) = (i % 8, i / 8);
//!     if (2..6).contains(&x) && (2..6).contains(&y) {
//!         *v = 255.0;
//!     }
//! }
//!
//! let map = compute_thickness_map(image, &ThicknessParams::new().with_threads(2)).unwrap();
//! println!("{}", map.stats);
//! assert_eq!(map.stats.foreground_voxels, 16);
//! ```
//!
//! # Running Stages Separately
//!
//! Every stage is a public function taking a [`ParallelForEach`] and a
//! [`ProgressSink`], so callers can stop after the distance map or feed a
//! ridge of their own to [`squared_radius_map`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod distance;
mod error;
mod finalize;
mod parallel;
mod params;
mod pipeline;
mod progress;
mod radius;
mod result;
mod ridge;
mod tables;

// Re-export main types and functions
pub use distance::{
    BACKGROUND, UNREACHED, prepare, squared_distance_map, squared_distance_transform,
};
pub use error::{CacheMiss, ThicknessError, ThicknessResult};
pub use finalize::{round_to_integer_radii, squared_radius_to_diameter};
pub use parallel::{Interrupt, ParallelForEach};
pub use params::{DEFAULT_MEMORY_BUDGET, ThicknessParams};
pub use pipeline::{PipelineState, ThicknessPipeline, compute_thickness_map};
pub use progress::{NoProgress, ProgressSink, Stage};
pub use radius::{
    BlockPlan, RadiusMap, ReconstructionMode, distribution_axis, mean_nonzero_radius,
    memory_requirement, plan_blocks, squared_radius_map, squared_radius_map_multi_block,
    squared_radius_map_single_block,
};
pub use result::{ThicknessMap, ThicknessStats};
pub use ridge::{distance_ridge, max_squared_radius, squared_distance_ridge};
pub use tables::{
    CircleFitTable, DanielssonTables, NeighborClass, SqrtTable, circle_fits,
    is_sum_of_three_squares, isqrt_below,
};
