//! Memory-mapped files addressed by element index.
//!
//! Large files are mapped as a sequence of fixed-size windows rather than one
//! contiguous region, so that files far larger than the address-space budget
//! of a single mapping can still be addressed. The window size is a multiple
//! of every supported element width, which guarantees that no element ever
//! straddles two windows.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut, MmapOptions};
use tracing::debug;

use crate::error::{IoError, IoResult};

/// Largest window mapped at once (1 GiB).
pub const MAX_WINDOW_SIZE: u64 = 1 << 30;

/// Widest supported element in bytes; window sizes must be a multiple of it.
const MAX_ELEMENT_WIDTH: u64 = 8;

/// Options controlling how a [`MappedFile`] is mapped.
///
/// # Example
///
/// ```
/// use voxel_io::MapOptions;
///
/// let dir = tempfile::tempdir().unwrap();
/// let path = dir.path().join("values.bin");
///
/// let mut file = MapOptions::new()
///     .window_size(16)
///     .open_write(&path, 64)
///     .unwrap();
/// file.write_u64(5, 0xDEAD_BEEF).unwrap();
/// file.close().unwrap();
///
/// let file = MapOptions::new().window_size(16).open_read(&path).unwrap();
/// assert_eq!(file.read_u64(5).unwrap(), 0xDEAD_BEEF);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapOptions {
    window_size: u64,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            window_size: MAX_WINDOW_SIZE,
        }
    }
}

impl MapOptions {
    /// Default options: 1 GiB windows.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            window_size: MAX_WINDOW_SIZE,
        }
    }

    /// Sets the window size in bytes.
    ///
    /// Must be positive, a multiple of 8 and at most [`MAX_WINDOW_SIZE`];
    /// this is checked when a file is opened.
    #[must_use]
    pub const fn window_size(mut self, window_size: u64) -> Self {
        self.window_size = window_size;
        self
    }

    fn validate(&self) -> IoResult<()> {
        if self.window_size == 0
            || self.window_size % MAX_ELEMENT_WIDTH != 0
            || self.window_size > MAX_WINDOW_SIZE
        {
            return Err(IoError::invalid_argument(format!(
                "window size {} must be a positive multiple of {MAX_ELEMENT_WIDTH} up to {MAX_WINDOW_SIZE}",
                self.window_size
            )));
        }
        Ok(())
    }

    /// Maps an existing file read-only.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid, the file cannot be
    /// opened, or a window cannot be mapped.
    pub fn open_read(&self, path: impl AsRef<Path>) -> IoResult<MappedFile> {
        self.validate()?;
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| IoError::Open {
            path: path.clone(),
            source,
        })?;
        let len = file.metadata()?.len();
        let windows = self.map_windows(&file, &path, len, false)?;
        debug!(path = %path.display(), len, windows = windows.len(), "Mapped file read-only");
        Ok(MappedFile {
            path,
            len,
            window_size: self.window_size,
            windows,
        })
    }

    /// Opens or creates a file, sets its length to `len` bytes, and maps it
    /// read-write.
    ///
    /// Existing content within the new length is preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if the options are invalid, the file cannot be opened
    /// or resized, or a window cannot be mapped.
    pub fn open_write(&self, path: impl AsRef<Path>, len: u64) -> IoResult<MappedFile> {
        self.validate()?;
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| IoError::Open {
                path: path.clone(),
                source,
            })?;
        file.set_len(len).map_err(|source| IoError::Resize {
            path: path.clone(),
            len,
            source,
        })?;
        let windows = self.map_windows(&file, &path, len, true)?;
        debug!(path = %path.display(), len, windows = windows.len(), "Mapped file read-write");
        Ok(MappedFile {
            path,
            len,
            window_size: self.window_size,
            windows,
        })
    }

    fn map_windows(&self, file: &File, path: &Path, len: u64, writable: bool) -> IoResult<Vec<Window>> {
        let mut windows = Vec::new();
        let mut offset = 0;
        while offset < len {
            let window_len = self.window_size.min(len - offset);
            let map_err = |source| IoError::Map {
                path: path.to_path_buf(),
                offset,
                len: window_len,
                source,
            };
            let size = usize::try_from(window_len)
                .map_err(|_| IoError::invalid_argument("window does not fit in memory"))?;
            let mut options = MmapOptions::new();
            options.offset(offset).len(size);
            // SAFETY: the file is owned by this process for the lifetime of
            // the mapping; nothing truncates it while windows are alive.
            let window = if writable {
                Window::ReadWrite(unsafe { options.map_mut(file) }.map_err(map_err)?)
            } else {
                Window::ReadOnly(unsafe { options.map(file) }.map_err(map_err)?)
            };
            windows.push(window);
            offset += window_len;
        }
        Ok(windows)
    }
}

enum Window {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Window {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::ReadOnly(map) => &map[..],
            Self::ReadWrite(map) => &map[..],
        }
    }
}

/// A file mapped into memory as a series of windows.
///
/// Elements are addressed by index and width: element `i` of width `w`
/// starts at byte `i * w`. All multi-byte values are little-endian.
pub struct MappedFile {
    path: PathBuf,
    len: u64,
    window_size: u64,
    windows: Vec<Window>,
}

impl std::fmt::Debug for MappedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedFile")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("window_size", &self.window_size)
            .field("windows", &self.windows.len())
            .finish()
    }
}

impl MappedFile {
    /// Maps an existing file read-only with default options.
    ///
    /// # Errors
    ///
    /// See [`MapOptions::open_read`].
    pub fn open_read(path: impl AsRef<Path>) -> IoResult<Self> {
        MapOptions::new().open_read(path)
    }

    /// Opens or creates a file of `len` bytes read-write with default options.
    ///
    /// # Errors
    ///
    /// See [`MapOptions::open_write`].
    pub fn open_write(path: impl AsRef<Path>, len: u64) -> IoResult<Self> {
        MapOptions::new().open_write(path, len)
    }

    /// Path of the mapped file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File length in bytes.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the file is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of mapped windows.
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }

    /// Splits element `index` of width `N` into (window, offset).
    #[allow(clippy::cast_possible_truncation)]
    fn locate<const N: usize>(&self, index: u64) -> IoResult<(usize, usize)> {
        let width = N as u64;
        let out_of_range = || IoError::OutOfRange {
            index,
            width,
            len: self.len,
        };
        let start = index.checked_mul(width).ok_or_else(out_of_range)?;
        if start.checked_add(width).is_none_or(|end| end > self.len) {
            return Err(out_of_range());
        }
        // Window indices and offsets are bounded by the mapped length.
        Ok((
            (start / self.window_size) as usize,
            (start % self.window_size) as usize,
        ))
    }

    fn read_array<const N: usize>(&self, index: u64) -> IoResult<[u8; N]> {
        let (window, offset) = self.locate::<N>(index)?;
        let bytes = &self.windows[window].bytes()[offset..offset + N];
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn write_array<const N: usize>(&mut self, index: u64, value: [u8; N]) -> IoResult<()> {
        let (window, offset) = self.locate::<N>(index)?;
        match &mut self.windows[window] {
            Window::ReadWrite(map) => {
                map[offset..offset + N].copy_from_slice(&value);
                Ok(())
            }
            Window::ReadOnly(_) => Err(IoError::ReadOnly {
                path: self.path.clone(),
            }),
        }
    }

    /// Reads the 16-bit signed element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutOfRange`] if the element lies past the end.
    pub fn read_i16(&self, index: u64) -> IoResult<i16> {
        self.read_array(index).map(i16::from_le_bytes)
    }

    /// Reads the 32-bit float element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutOfRange`] if the element lies past the end.
    pub fn read_f32(&self, index: u64) -> IoResult<f32> {
        self.read_array(index).map(f32::from_le_bytes)
    }

    /// Reads the 64-bit unsigned element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutOfRange`] if the element lies past the end.
    pub fn read_u64(&self, index: u64) -> IoResult<u64> {
        self.read_array(index).map(u64::from_le_bytes)
    }

    /// Writes the 16-bit signed element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutOfRange`] past the end and [`IoError::ReadOnly`]
    /// on a read-only mapping.
    pub fn write_i16(&mut self, index: u64, value: i16) -> IoResult<()> {
        self.write_array(index, value.to_le_bytes())
    }

    /// Writes the 32-bit float element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutOfRange`] past the end and [`IoError::ReadOnly`]
    /// on a read-only mapping.
    pub fn write_f32(&mut self, index: u64, value: f32) -> IoResult<()> {
        self.write_array(index, value.to_le_bytes())
    }

    /// Writes the 64-bit unsigned element at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutOfRange`] past the end and [`IoError::ReadOnly`]
    /// on a read-only mapping.
    pub fn write_u64(&mut self, index: u64, value: u64) -> IoResult<()> {
        self.write_array(index, value.to_le_bytes())
    }

    /// Flushes writable windows to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS fails to flush a window.
    pub fn flush(&self) -> IoResult<()> {
        for window in &self.windows {
            if let Window::ReadWrite(map) = window {
                map.flush()?;
            }
        }
        Ok(())
    }

    /// Flushes and unmaps the file.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails; the windows are unmapped regardless.
    pub fn close(self) -> IoResult<()> {
        self.flush()
    }
}
