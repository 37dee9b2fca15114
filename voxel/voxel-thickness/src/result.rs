//! Result types for local thickness computation.

use voxel_types::VoxelGrid;

use crate::radius::ReconstructionMode;

/// Summary of a thickness map.
///
/// # Example
///
/// ```
/// use voxel_thickness::ThicknessStats;
///
/// let stats = ThicknessStats::default();
/// assert!(!stats.has_foreground());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ThicknessStats {
    /// Number of voxels with a nonzero thickness.
    pub foreground_voxels: usize,
    /// Total number of voxels.
    pub total_voxels: usize,
    /// Smallest nonzero diameter (0 if there is none).
    pub min_diameter: f64,
    /// Largest diameter.
    pub max_diameter: f64,
    /// Mean diameter over nonzero voxels.
    pub mean_diameter: f64,
    /// Whether reconstruction went through temporary block files.
    pub multi_block: bool,
    /// Blocks used per sweep axis; empty for in-memory reconstruction.
    pub blocks_per_dimension: Vec<usize>,
}

impl ThicknessStats {
    /// Collects statistics of a diameter grid.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_diameters(diameters: &VoxelGrid<f32>, mode: &ReconstructionMode) -> Self {
        let mut stats = Self {
            total_voxels: diameters.len(),
            min_diameter: f64::INFINITY,
            ..Self::default()
        };
        let mut sum = 0.0;
        for &d in diameters.as_slice().iter().filter(|&&d| d > 0.0) {
            let d = f64::from(d);
            stats.foreground_voxels += 1;
            stats.min_diameter = stats.min_diameter.min(d);
            stats.max_diameter = stats.max_diameter.max(d);
            sum += d;
        }
        if stats.foreground_voxels == 0 {
            stats.min_diameter = 0.0;
        } else {
            stats.mean_diameter = sum / stats.foreground_voxels as f64;
        }
        if let ReconstructionMode::MultiBlock {
            blocks_per_dimension,
        } = mode
        {
            stats.multi_block = true;
            stats.blocks_per_dimension.clone_from(blocks_per_dimension);
        }
        stats
    }

    /// Check if any voxel has a nonzero thickness.
    #[must_use]
    pub const fn has_foreground(&self) -> bool {
        self.foreground_voxels > 0
    }

    /// Percentage of voxels with a nonzero thickness.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn foreground_percent(&self) -> f64 {
        if self.total_voxels == 0 {
            0.0
        } else {
            100.0 * self.foreground_voxels as f64 / self.total_voxels as f64
        }
    }
}

impl std::fmt::Display for ThicknessStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Local Thickness:")?;
        writeln!(
            f,
            "  Foreground voxels: {} ({:.1}%)",
            self.foreground_voxels,
            self.foreground_percent()
        )?;
        writeln!(f, "  Min diameter: {:.3}", self.min_diameter)?;
        writeln!(f, "  Max diameter: {:.3}", self.max_diameter)?;
        writeln!(f, "  Mean diameter: {:.3}", self.mean_diameter)?;
        if self.multi_block {
            writeln!(f, "  Blocks per dimension: {:?}", self.blocks_per_dimension)?;
        }
        Ok(())
    }
}

/// A local thickness map: the diameter of the largest inscribed sphere
/// covering each voxel, 0 in the background.
#[derive(Debug, Clone, PartialEq)]
pub struct ThicknessMap {
    /// Per-voxel diameters.
    pub diameters: VoxelGrid<f32>,
    /// Summary of `diameters`.
    pub stats: ThicknessStats,
}

impl ThicknessMap {
    /// Wraps a diameter grid, computing its statistics.
    #[must_use]
    pub fn new(diameters: VoxelGrid<f32>, mode: &ReconstructionMode) -> Self {
        let stats = ThicknessStats::from_diameters(&diameters, mode);
        Self { diameters, stats }
    }

    /// Returns the diameter grid.
    #[must_use]
    pub fn into_diameters(self) -> VoxelGrid<f32> {
        self.diameters
    }
}
