//! Dense voxel grids for CortenForge volume processing.
//!
//! This crate provides the foundational lattice types shared by the volume
//! pipeline crates:
//!
//! - [`VoxelGrid`] - Dense 3D lattice with X-fastest linear storage
//! - [`VoxelCoord`] - Integer voxel coordinates
//! - [`Axis`] - One of the three lattice axes
//! - [`RowLayout`] - Enumeration of the 1D rows of a box along an axis
//! - [`Block`] - Axis-aligned sub-box used for out-of-core processing
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies** and no I/O. It can
//! be used in CLI tools, servers, and WASM targets alike.
//!
//! # Coordinate Systems
//!
//! Grids are indexed `(x, y, z)` with extents `(width, height, depth)`. A 2D
//! image is a grid with `depth == 1`; its [`VoxelGrid::dimensionality`] is 2.
//!
//! # Example
//!
//! ```
//! use voxel_types::{Axis, VoxelCoord, VoxelGrid};
//!
//! // A binary 8-bit image converted to floats.
//! let samples = vec![0u8, 255, 255, 0];
//! let grid = VoxelGrid::from_samples([4, 1, 1], &samples).unwrap();
//! assert_eq!(grid.dimensionality(), 1);
//!
//! // Sweep every row along X.
//! let rows = grid.rows(Axis::X);
//! assert_eq!(rows.count(), 1);
//! assert_eq!(rows.len(), 4);
//! assert_eq!(grid.get(VoxelCoord::new(1, 0, 0)), Some(&255.0));
//! ```
//!
//! # Quality Standards
//!
//! This crate maintains A-grade standards:
//! - ≥90% test coverage
//! - Zero clippy/doc warnings
//! - Zero `unwrap`/`expect` in library code

// Safety: Deny unwrap/expect in library code. Tests may use them (workspace warns).
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![warn(missing_docs)]

mod block;
mod coord;
mod error;
mod grid;

pub use block::Block;
pub use coord::{Axis, VoxelCoord};
pub use error::{VoxelError, VoxelResult};
pub use grid::{RowLayout, VoxelGrid, dimensionality_of, linear_index};
