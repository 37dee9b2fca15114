//! Parameters for local thickness computation.

use std::path::PathBuf;

/// Default memory budget for radius reconstruction (2 GiB).
pub const DEFAULT_MEMORY_BUDGET: u64 = 2 << 30;

/// Parameters for local thickness computation.
///
/// # Example
///
/// ```
/// use voxel_thickness::ThicknessParams;
///
/// // Defaults: background is 0, 2 GiB budget, no table cache.
/// let params = ThicknessParams::default();
/// assert_eq!(params.background_value, 0.0);
/// assert!(params.table_cache_dir.is_none());
///
/// // Bright background, tight budget, 4 workers.
/// let params = ThicknessParams::new()
///     .with_background_value(255.0)
///     .with_memory_budget(64 << 20)
///     .with_threads(4);
/// assert_eq!(params.threads, Some(4));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThicknessParams {
    /// Voxels equal to this value are background; everything else is
    /// foreground.
    pub background_value: f32,

    /// Memory budget in bytes for radius reconstruction. Volumes whose
    /// estimated working set exceeds it are processed block by block.
    pub memory_budget: u64,

    /// Directory for block intermediates. Defaults to the system temp
    /// directory.
    pub temp_dir: Option<PathBuf>,

    /// Directory holding cached distance-ridge tables. `None` disables the
    /// cache.
    pub table_cache_dir: Option<PathBuf>,

    /// Round ridge values to squares of integers before reconstruction.
    pub integer_radius_approximation: bool,

    /// Worker count. `None` uses the available hardware parallelism.
    pub threads: Option<usize>,
}

impl Default for ThicknessParams {
    fn default() -> Self {
        Self::new()
    }
}

impl ThicknessParams {
    /// Default parameters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            background_value: 0.0,
            memory_budget: DEFAULT_MEMORY_BUDGET,
            temp_dir: None,
            table_cache_dir: None,
            integer_radius_approximation: false,
            threads: None,
        }
    }

    /// Set the background value.
    #[must_use]
    pub const fn with_background_value(mut self, value: f32) -> Self {
        self.background_value = value;
        self
    }

    /// Set the memory budget in bytes.
    #[must_use]
    pub const fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Set the directory for block intermediates.
    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Set the directory for cached ridge tables.
    #[must_use]
    pub fn with_table_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.table_cache_dir = Some(dir.into());
        self
    }

    /// Enable or disable the integer radius approximation.
    #[must_use]
    pub const fn with_integer_radius_approximation(mut self, enabled: bool) -> Self {
        self.integer_radius_approximation = enabled;
        self
    }

    /// Set the worker count.
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }
}
