//! On-disk storage of per-voxel sphere-center sets for one sweep dimension.
//!
//! Each dimension of an out-of-core sweep produces two kinds of file:
//!
//! - An index raw volume covering the whole grid, one [`BlockRecord`] per
//!   voxel (see [`raw_file_name`]).
//! - One data file per block, holding the center sets of that block's voxels
//!   in block-local storage order.
//!
//! ```text
//! data file:  repeat per voxel {
//!                 i16 count
//!                 repeat count { i16 x, i16 y }
//!             }
//! ```
//!
//! All values are little-endian. A record's offset is the byte position of
//! the voxel's count field.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use voxel_types::{Block, VoxelGrid};

use crate::error::{IoError, IoResult};
use crate::mapped::MappedFile;
use crate::raw::{raw_file_name, read_raw_block, write_raw_block};
use crate::record::{BlockRecord, RiSet, SourceRef};
use crate::workspace::{RetryPolicy, remove_file_with_retry};

/// The index and data files of one sweep dimension.
///
/// # Example
///
/// ```
/// use voxel_io::{RiBlockFiles, RiSet, SourceRef};
/// use voxel_types::{Block, VoxelGrid};
///
/// let dir = tempfile::tempdir().unwrap();
/// let files = RiBlockFiles::new(dir.path().join("ri_dim0"), [2, 1, 1]);
///
/// let mut sets: VoxelGrid<RiSet> = VoxelGrid::new(2, 1, 1).unwrap();
/// sets.as_mut_slice()[1] = vec![SourceRef::new(1, 0)].into_boxed_slice();
///
/// let block = Block::whole([2, 1, 1]);
/// files.write_block(0, &block, &sets).unwrap();
/// assert_eq!(files.read_block(&block).unwrap(), sets);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiBlockFiles {
    prefix: PathBuf,
    dimensions: [usize; 3],
}

impl RiBlockFiles {
    /// Files named after `prefix` for a grid of `dimensions`.
    #[must_use]
    pub fn new(prefix: impl Into<PathBuf>, dimensions: [usize; 3]) -> Self {
        Self {
            prefix: prefix.into(),
            dimensions,
        }
    }

    /// Path of the index raw volume.
    #[must_use]
    pub fn index_path(&self) -> PathBuf {
        raw_file_name(&self.prefix, self.dimensions)
    }

    /// Path of the data file for `block_id`.
    #[must_use]
    pub fn data_path(&self, block_id: u16) -> PathBuf {
        let mut name = self.prefix.as_os_str().to_owned();
        name.push(format!("_block{block_id}.dat"));
        PathBuf::from(name)
    }

    /// Writes the center sets of one block.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidArgument`] if `sets` does not match the
    /// block size, [`IoError::CapacityExceeded`] if a set holds more than
    /// `i16::MAX` centers or the data file outgrows 48-bit offsets, and I/O
    /// errors from the file system.
    pub fn write_block(&self, block_id: u16, block: &Block, sets: &VoxelGrid<RiSet>) -> IoResult<()> {
        if sets.dimensions() != block.size() {
            return Err(IoError::invalid_argument(format!(
                "center sets {:?} do not match block size {:?}",
                sets.dimensions(),
                block.size()
            )));
        }

        let data_path = self.data_path(block_id);
        let file = File::create(&data_path).map_err(|source| IoError::Open {
            path: data_path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);
        let mut index = VoxelGrid::<u64>::with_dimensions(block.size())?;
        let mut offset: u64 = 0;
        let mut centers: u64 = 0;

        for (slot, set) in index.as_mut_slice().iter_mut().zip(sets.as_slice()) {
            let count = i16::try_from(set.len()).map_err(|_| {
                IoError::capacity_exceeded(format!("{} centers exceed one voxel's limit", set.len()))
            })?;
            *slot = BlockRecord::new(block_id, offset)?.encode();
            writer.write_all(&count.to_le_bytes())?;
            for src in set.iter() {
                writer.write_all(&src.x.to_le_bytes())?;
                writer.write_all(&src.y.to_le_bytes())?;
            }
            let len = set.len() as u64;
            offset += 2 + 4 * len;
            centers += len;
        }
        writer.flush()?;

        write_raw_block(&self.index_path(), &index, block, self.dimensions)?;
        debug!(
            block = block_id,
            bytes = offset,
            centers,
            "Wrote center sets"
        );
        Ok(())
    }

    /// Reads the center sets of the voxels in `block`.
    ///
    /// Records may point into the data file of any block written for this
    /// dimension; each referenced file is mapped once and released on return.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidRecord`] for odd offsets or negative counts,
    /// and I/O errors for missing or truncated files.
    pub fn read_block(&self, block: &Block) -> IoResult<VoxelGrid<RiSet>> {
        let index: VoxelGrid<u64> = read_raw_block(&self.index_path(), block, self.dimensions)?;
        let mut files: HashMap<u16, MappedFile> = HashMap::new();
        let mut sets = VoxelGrid::<RiSet>::with_dimensions(block.size())?;

        for (slot, &bits) in sets.as_mut_slice().iter_mut().zip(index.as_slice()) {
            let record = BlockRecord::decode(bits);
            if record.offset() % 2 != 0 {
                return Err(IoError::invalid_record(format!(
                    "odd offset {} in block {}",
                    record.offset(),
                    record.block()
                )));
            }
            let file = match files.entry(record.block()) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    entry.insert(MappedFile::open_read(self.data_path(record.block()))?)
                }
            };
            let position = record.offset() / 2;
            let count = file.read_i16(position)?;
            let count = u64::try_from(count).map_err(|_| {
                IoError::invalid_record(format!("negative center count {count}"))
            })?;
            let mut set = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
            for k in 0..count {
                let x = file.read_i16(position + 1 + 2 * k)?;
                let y = file.read_i16(position + 2 + 2 * k)?;
                set.push(SourceRef::new(x, y));
            }
            *slot = set.into_boxed_slice();
        }
        debug!(files = files.len(), voxels = sets.len(), "Read center sets");
        Ok(sets)
    }

    /// Deletes every file of this dimension, retrying on failure.
    ///
    /// Returns the number of files that could not be deleted; each is logged
    /// as a warning.
    #[must_use]
    pub fn remove(&self, policy: &RetryPolicy) -> usize {
        let Some(name) = self.prefix.file_name().map(|n| format!("{}_", n.to_string_lossy())) else {
            return 0;
        };
        let dir = self
            .prefix
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "Cannot list temporary files");
                return 0;
            }
        };
        let mut failed = 0;
        for entry in entries.flatten() {
            if !entry.file_name().to_string_lossy().starts_with(&name) {
                continue;
            }
            let path = entry.path();
            if let Err(err) = remove_file_with_retry(&path, policy) {
                warn!(path = %path.display(), error = %err, "Failed to delete temporary file");
                failed += 1;
            }
        }
        failed
    }
}
