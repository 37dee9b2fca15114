//! Headerless raw volumes and block-wise access to them.
//!
//! A raw volume is the voxels of a grid written back to back in X-fastest
//! order, each as a little-endian value of fixed width. The dimensions are
//! carried in the file name. Blocks of a larger volume can be written into
//! and read out of such a file without touching the rest of it.

use std::path::{Path, PathBuf};

use tracing::debug;
use voxel_types::{Block, VoxelGrid};

use crate::error::{IoError, IoResult};
use crate::mapped::{MapOptions, MappedFile};

/// A fixed-width value that can be stored in a raw volume.
pub trait RawSample: Copy + Default {
    /// Width in bytes.
    const WIDTH: u64;

    /// Reads the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the element lies past the end of the file.
    fn read(file: &MappedFile, index: u64) -> IoResult<Self>;

    /// Writes the element at `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the element lies past the end of the file or the
    /// file is read-only.
    fn write(self, file: &mut MappedFile, index: u64) -> IoResult<()>;
}

impl RawSample for i16 {
    const WIDTH: u64 = 2;

    fn read(file: &MappedFile, index: u64) -> IoResult<Self> {
        file.read_i16(index)
    }

    fn write(self, file: &mut MappedFile, index: u64) -> IoResult<()> {
        file.write_i16(index, self)
    }
}

impl RawSample for f32 {
    const WIDTH: u64 = 4;

    fn read(file: &MappedFile, index: u64) -> IoResult<Self> {
        file.read_f32(index)
    }

    fn write(self, file: &mut MappedFile, index: u64) -> IoResult<()> {
        file.write_f32(index, self)
    }
}

impl RawSample for u64 {
    const WIDTH: u64 = 8;

    fn read(file: &MappedFile, index: u64) -> IoResult<Self> {
        file.read_u64(index)
    }

    fn write(self, file: &mut MappedFile, index: u64) -> IoResult<()> {
        file.write_u64(index, self)
    }
}

/// Builds `<prefix>_<width>x<height>x<depth>.raw`.
///
/// A prefix that already ends in the suffix for `dimensions` (any case) is
/// returned unchanged; any other prefix, including one with a `.raw`
/// extension or a suffix for other extents, gets the suffix appended.
///
/// # Example
///
/// ```
/// use std::path::Path;
/// use voxel_io::raw_file_name;
///
/// let name = raw_file_name(Path::new("/tmp/ri_dim0"), [64, 32, 8]);
/// assert_eq!(name, Path::new("/tmp/ri_dim0_64x32x8.raw"));
///
/// let explicit = raw_file_name(Path::new("/tmp/ri_dim0_64X32X8.RAW"), [64, 32, 8]);
/// assert_eq!(explicit, Path::new("/tmp/ri_dim0_64X32X8.RAW"));
///
/// let plain = raw_file_name(Path::new("/tmp/volume.raw"), [64, 32, 8]);
/// assert_eq!(plain, Path::new("/tmp/volume.raw_64x32x8.raw"));
/// ```
#[must_use]
pub fn raw_file_name(prefix: &Path, dimensions: [usize; 3]) -> PathBuf {
    let [width, height, depth] = dimensions;
    let suffix = format!("_{width}x{height}x{depth}.raw");
    if prefix
        .to_string_lossy()
        .to_ascii_lowercase()
        .ends_with(&suffix)
    {
        return prefix.to_path_buf();
    }
    let mut name = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn byte_len<T: RawSample>(dimensions: [usize; 3]) -> IoResult<u64> {
    dimensions
        .iter()
        .try_fold(T::WIDTH, |acc, &extent| {
            u64::try_from(extent).ok().and_then(|e| acc.checked_mul(e))
        })
        .ok_or_else(|| IoError::capacity_exceeded(format!("raw volume {dimensions:?} is too large")))
}

fn check_block(block: &Block, dimensions: [usize; 3]) -> IoResult<()> {
    let fitted = Block::clamped(block.origin(), block.size(), dimensions)?;
    if fitted.size() != block.size() {
        return Err(IoError::invalid_argument(format!(
            "block {:?} at {:?} extends past volume {dimensions:?}",
            block.size(),
            block.origin()
        )));
    }
    Ok(())
}

/// Writes `data` into the region `block` of the raw volume at `path`.
///
/// The file and its parent directories are created if needed, and the file
/// is resized to hold the whole volume of `dimensions`; voxels outside the
/// block are left untouched.
///
/// # Errors
///
/// Returns an error if the block does not fit in the volume, its size does not
/// match `data`, or the file cannot be mapped.
pub fn write_raw_block<T: RawSample>(
    path: &Path,
    data: &VoxelGrid<T>,
    block: &Block,
    dimensions: [usize; 3],
) -> IoResult<()> {
    write_raw_block_with(MapOptions::new(), path, data, block, dimensions)
}

/// [`write_raw_block`] with explicit mapping options.
///
/// # Errors
///
/// See [`write_raw_block`].
pub fn write_raw_block_with<T: RawSample>(
    options: MapOptions,
    path: &Path,
    data: &VoxelGrid<T>,
    block: &Block,
    dimensions: [usize; 3],
) -> IoResult<()> {
    check_block(block, dimensions)?;
    if data.dimensions() != block.size() {
        return Err(IoError::invalid_argument(format!(
            "block data {:?} does not match block size {:?}",
            data.dimensions(),
            block.size()
        )));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| IoError::Open {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let mut file = options.open_write(path, byte_len::<T>(dimensions)?)?;
    for (index, value) in data.as_slice().iter().enumerate() {
        let target = block.global_index(data.coord_of(index), dimensions);
        value.write(&mut file, target as u64)?;
    }
    debug!(path = %path.display(), voxels = data.len(), "Wrote raw block");
    file.close()
}

/// Reads the region `block` out of the raw volume at `path`.
///
/// # Errors
///
/// Returns an error if the block does not fit in the volume or the file is
/// missing or too short.
pub fn read_raw_block<T: RawSample>(
    path: &Path,
    block: &Block,
    dimensions: [usize; 3],
) -> IoResult<VoxelGrid<T>> {
    read_raw_block_with(MapOptions::new(), path, block, dimensions)
}

/// [`read_raw_block`] with explicit mapping options.
///
/// # Errors
///
/// See [`read_raw_block`].
pub fn read_raw_block_with<T: RawSample>(
    options: MapOptions,
    path: &Path,
    block: &Block,
    dimensions: [usize; 3],
) -> IoResult<VoxelGrid<T>> {
    check_block(block, dimensions)?;
    let file = options.open_read(path)?;
    let mut data = VoxelGrid::<T>::with_dimensions(block.size())?;
    for index in 0..data.len() {
        let source = block.global_index(data.coord_of(index), dimensions);
        data.as_mut_slice()[index] = T::read(&file, source as u64)?;
    }
    debug!(path = %path.display(), voxels = data.len(), "Read raw block");
    Ok(data)
}

/// Writes a whole grid as a raw volume.
///
/// # Errors
///
/// Returns an error if the file cannot be created or mapped.
pub fn write_raw<T: RawSample>(path: &Path, data: &VoxelGrid<T>) -> IoResult<()> {
    write_raw_block(path, data, &Block::whole(data.dimensions()), data.dimensions())
}

/// Reads a whole raw volume of the given dimensions.
///
/// # Errors
///
/// Returns an error if the file is missing or too short.
pub fn read_raw<T: RawSample>(path: &Path, dimensions: [usize; 3]) -> IoResult<VoxelGrid<T>> {
    read_raw_block(path, &Block::whole(dimensions), dimensions)
}
