//! File I/O for out-of-core voxel processing.
//!
//! This crate provides the storage layer used when a volume's working state
//! does not fit in memory:
//!
//! - [`MappedFile`] - Memory-mapped file split into bounded windows
//! - [`write_raw_block`] / [`read_raw_block`] - Block-wise access to raw volumes
//! - [`SourceRef`] / [`BlockRecord`] - 32-bit and 64-bit packed records
//! - [`RiBlockFiles`] - Index and data files of one sweep dimension
//! - [`TempWorkspace`] - Per-run temporary directory with retrying cleanup
//!
//! # File Formats
//!
//! | Format | Layout | Endianness |
//! |--------|--------|------------|
//! | Raw volume | `<prefix>_<w>x<h>x<d>.raw`, fixed-width voxels, X fastest | little |
//! | Block data | `<prefix>_block<n>.dat`, per voxel `i16 count` + `count x (i16, i16)` | little |
//!
//! # Example
//!
//! ```
//! use voxel_io::{TempWorkspace, RiSet, SourceRef};
//! use voxel_types::{Block, VoxelGrid};
//!
//! let base = tempfile::tempdir().unwrap();
//! let workspace = TempWorkspace::create(Some(base.path())).unwrap();
//! let files = workspace.dimension_files(0, [4, 4, 1]);
//!
//! let mut sets: VoxelGrid<RiSet> = VoxelGrid::new(4, 4, 1).unwrap();
//! sets.as_mut_slice()[5] = vec![SourceRef::new(1, 1)].into_boxed_slice();
//! files.write_block(0, &Block::whole([4, 4, 1]), &sets).unwrap();
//!
//! let back = files.read_block(&Block::whole([4, 4, 1])).unwrap();
//! assert_eq!(back, sets);
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

mod error;
mod mapped;
mod raw;
mod record;
mod ri_block;
mod workspace;

pub use error::{IoError, IoResult};
pub use mapped::{MAX_WINDOW_SIZE, MapOptions, MappedFile};
pub use raw::{
    RawSample, raw_file_name, read_raw, read_raw_block, read_raw_block_with, write_raw,
    write_raw_block, write_raw_block_with,
};
pub use record::{BlockRecord, MAX_BLOCK_ID, MAX_BLOCK_OFFSET, RiSet, SourceRef};
pub use ri_block::RiBlockFiles;
pub use workspace::{RetryPolicy, TEMP_ROOT_NAME, TempWorkspace, remove_file_with_retry};
