//! The local thickness pipeline.
//!
//! Stages run strictly in order:
//!
//! 1. squared distance map ([`squared_distance_map`])
//! 2. distance ridge ([`distance_ridge`]), optionally rounded to integer
//!    radii ([`round_to_integer_radii`])
//! 3. squared radius map ([`squared_radius_map`])
//! 4. diameters ([`squared_radius_to_diameter`])
//!
//! A failing stage aborts the run; later stages are not attempted.

use tracing::info;
use voxel_types::VoxelGrid;

use crate::distance::squared_distance_map;
use crate::error::{ThicknessError, ThicknessResult};
use crate::finalize::{round_to_integer_radii, squared_radius_to_diameter};
use crate::parallel::{Interrupt, ParallelForEach};
use crate::params::ThicknessParams;
use crate::progress::{NoProgress, ProgressSink};
use crate::radius::squared_radius_map;
use crate::result::ThicknessMap;
use crate::ridge::distance_ridge;

/// Last stage a pipeline completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Nothing has run yet.
    Idle,
    /// The squared distance map is computed.
    DistanceComputed,
    /// The distance ridge is computed.
    RidgeComputed,
    /// The squared radius map is computed.
    RadiusComputed,
    /// The diameter map is computed.
    Finalized,
}

/// Runs the thickness stages on one volume.
///
/// # Example
///
/// ```
/// use voxel_thickness::{PipelineState, ThicknessParams, ThicknessPipeline};
/// use voxel_types::VoxelGrid;
///
/// // A 3-voxel thick slab in a 7x7x7 volume.
/// let mut volume = VoxelGrid::<f32>::new(7, 7, 7).unwrap();
/// for (i, v) in volume.as_mut_slice().iter_mut().enumerate() {
///     let z = i / 49;
///     if (2..5).contains(&z) {
///         *v = 1.0;
///     }
/// }
///
/// let mut pipeline = ThicknessPipeline::new(ThicknessParams::new().with_threads(2));
/// let map = pipeline.run(volume).unwrap();
/// assert_eq!(pipeline.state(), PipelineState::Finalized);
/// assert!(map.stats.max_diameter > 0.0);
/// assert!(pipeline.run(VoxelGrid::new(2, 2, 2).unwrap()).is_err());
/// ```
pub struct ThicknessPipeline<'a> {
    params: ThicknessParams,
    progress: &'a dyn ProgressSink,
    interrupt: Interrupt,
    state: PipelineState,
}

impl std::fmt::Debug for ThicknessPipeline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThicknessPipeline")
            .field("params", &self.params)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ThicknessPipeline<'static> {
    /// Creates an idle pipeline that reports no progress.
    #[must_use]
    pub fn new(params: ThicknessParams) -> Self {
        Self {
            params,
            progress: &NoProgress,
            interrupt: Interrupt::new(),
            state: PipelineState::Idle,
        }
    }
}

impl<'a> ThicknessPipeline<'a> {
    /// Reports progress of every stage to `progress`.
    #[must_use]
    pub fn with_progress<'b>(self, progress: &'b dyn ProgressSink) -> ThicknessPipeline<'b>
    where
        'a: 'b,
    {
        ThicknessPipeline {
            params: self.params,
            progress,
            interrupt: self.interrupt,
            state: self.state,
        }
    }

    /// Uses `interrupt` to cancel a running computation.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// The parameters.
    #[must_use]
    pub const fn params(&self) -> &ThicknessParams {
        &self.params
    }

    /// The last completed stage.
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Computes the local thickness map of `volume`.
    ///
    /// # Errors
    ///
    /// Returns [`ThicknessError::InvalidArgument`] if the pipeline already
    /// ran, and otherwise the error of the first failing stage; the state
    /// then names the last stage that completed.
    pub fn run(&mut self, volume: VoxelGrid<f32>) -> ThicknessResult<ThicknessMap> {
        if self.state != PipelineState::Idle {
            return Err(ThicknessError::invalid_argument(format!(
                "pipeline already ran (state {:?})",
                self.state
            )));
        }
        let pool = ParallelForEach::new(self.params.threads)?.with_interrupt(self.interrupt.clone());
        let params = &self.params;
        info!(
            dimensions = ?volume.dimensions(),
            voxels = volume.len(),
            workers = pool.workers(),
            memory_budget = params.memory_budget,
            "Computing local thickness"
        );

        let dmap = squared_distance_map(volume, params.background_value, &pool, self.progress)?;
        self.state = PipelineState::DistanceComputed;

        let mut ridge = distance_ridge(
            &dmap,
            params.table_cache_dir.as_deref(),
            &pool,
            self.progress,
        )?;
        drop(dmap);
        if params.integer_radius_approximation {
            round_to_integer_radii(&mut ridge, &pool, self.progress)?;
        }
        self.state = PipelineState::RidgeComputed;

        let radius = squared_radius_map(
            &ridge,
            params.memory_budget,
            params.temp_dir.as_deref(),
            &pool,
            self.progress,
        )?;
        drop(ridge);
        self.state = PipelineState::RadiusComputed;

        let mut diameters = radius.squared_radii;
        squared_radius_to_diameter(&mut diameters, &pool, self.progress)?;
        self.state = PipelineState::Finalized;

        let map = ThicknessMap::new(diameters, &radius.mode);
        info!(
            foreground = map.stats.foreground_voxels,
            max_diameter = map.stats.max_diameter,
            multi_block = map.stats.multi_block,
            "Local thickness complete"
        );
        Ok(map)
    }
}

/// Computes the local thickness map of `volume` with `params`.
///
/// # Errors
///
/// Returns the error of the first failing stage.
///
/// # Example
///
/// ```
/// use voxel_thickness::{compute_thickness_map, ThicknessParams};
/// use voxel_types::VoxelGrid;
///
/// let volume = VoxelGrid::from_vec([5, 1, 1], vec![0.0, 1.0, 1.0, 1.0, 0.0]).unwrap();
/// let map = compute_thickness_map(volume, &ThicknessParams::new().with_threads(1)).unwrap();
/// assert_eq!(map.diameters.as_slice(), &[0.0, 4.0, 4.0, 4.0, 0.0]);
/// ```
pub fn compute_thickness_map(
    volume: VoxelGrid<f32>,
    params: &ThicknessParams,
) -> ThicknessResult<ThicknessMap> {
    ThicknessPipeline::new(params.clone()).run(volume)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::progress::Stage;
    use crate::progress::tests::RecordingSink;
    use approx::assert_relative_eq;
    use voxel_types::VoxelCoord;

    fn params() -> ThicknessParams {
        ThicknessParams::new().with_threads(2)
    }

    #[test]
    fn test_isolated_voxel_diameter() {
        let mut volume = VoxelGrid::<f32>::new(3, 3, 3).unwrap();
        volume.set(VoxelCoord::new(1, 1, 1), 1.0).unwrap();
        let map = compute_thickness_map(volume, &params()).unwrap();
        assert_eq!(map.diameters.get(VoxelCoord::new(1, 1, 1)), Some(&2.0));
        assert_eq!(map.stats.foreground_voxels, 1);
    }

    #[test]
    fn test_ball_diameter() {
        let (n, c, r) = (13usize, 6, 5);
        let mut volume = VoxelGrid::<f32>::new(n, n, n).unwrap();
        let coords: Vec<VoxelCoord> = (0..volume.len()).map(|i| volume.coord_of(i)).collect();
        let inside = |p: VoxelCoord| {
            let d = p - VoxelCoord::new(c, c, c);
            d.x * d.x + d.y * d.y + d.z * d.z < r * r
        };
        for &p in &coords {
            if inside(p) {
                volume.set(p, 1.0).unwrap();
            }
        }
        let map = compute_thickness_map(volume, &params()).unwrap();
        for &p in &coords {
            let expected = if inside(p) { 10.0 } else { 0.0 };
            assert_relative_eq!(*map.diameters.get(p).unwrap(), expected);
        }
        assert!(!map.stats.multi_block);
    }

    #[test]
    fn test_bright_background() {
        let volume = VoxelGrid::from_vec([5, 1, 1], vec![9.0, 1.0, 1.0, 1.0, 9.0]).unwrap();
        let map = compute_thickness_map(volume, &params().with_background_value(9.0)).unwrap();
        assert_eq!(map.diameters.as_slice(), &[0.0, 4.0, 4.0, 4.0, 0.0]);
    }

    #[test]
    fn test_tiny_budget_uses_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<f32> = (0..(8 * 7 * 6u32))
            .map(|i| if (i * 37 + 1) % 10 < 2 { 0.0 } else { 1.0 })
            .collect();
        let volume = VoxelGrid::from_vec([8, 7, 6], data).unwrap();
        let in_memory = compute_thickness_map(volume.clone(), &params()).unwrap();
        let blocked = compute_thickness_map(
            volume,
            &params().with_memory_budget(2_000).with_temp_dir(dir.path()),
        )
        .unwrap();
        assert!(blocked.stats.multi_block);
        assert_eq!(blocked.diameters, in_memory.diameters);
    }

    #[test]
    fn test_integer_radius_approximation() {
        let data: Vec<f32> = (0..(9 * 9 * 4u32))
            .map(|i| if (i * 13 + 5) % 7 == 0 { 0.0 } else { 1.0 })
            .collect();
        let volume = VoxelGrid::from_vec([9, 9, 4], data).unwrap();
        let map = compute_thickness_map(
            volume,
            &params().with_integer_radius_approximation(true),
        )
        .unwrap();
        for &d in map.diameters.as_slice() {
            assert_eq!(d.fract(), 0.0);
            assert_eq!(d as u32 % 2, 0);
        }
    }

    #[test]
    fn test_pipeline_runs_once() {
        let mut pipeline = ThicknessPipeline::new(params());
        assert_eq!(pipeline.state(), PipelineState::Idle);
        pipeline.run(VoxelGrid::new(3, 3, 1).unwrap()).unwrap();
        assert_eq!(pipeline.state(), PipelineState::Finalized);
        let again = pipeline.run(VoxelGrid::new(3, 3, 1).unwrap());
        assert!(matches!(again, Err(ThicknessError::InvalidArgument(_))));
    }

    #[test]
    fn test_interrupt_aborts_first_stage() {
        let interrupt = Interrupt::new();
        interrupt.raise();
        let mut pipeline = ThicknessPipeline::new(params()).with_interrupt(interrupt);
        let result = pipeline.run(VoxelGrid::filled(4, 4, 4, 1.0).unwrap());
        assert!(matches!(result, Err(ThicknessError::Interrupted)));
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn test_progress_covers_every_stage() {
        let sink = RecordingSink::default();
        let mut pipeline = ThicknessPipeline::new(params()).with_progress(&sink);
        pipeline.run(VoxelGrid::filled(4, 4, 4, 1.0).unwrap()).unwrap();
        let reports = sink.reports.lock().unwrap();
        for stage in [
            Stage::DistanceMap,
            Stage::DistanceRidge,
            Stage::RadiusMap,
            Stage::Finalize,
        ] {
            assert!(reports.iter().any(|&(s, _, _)| s == stage), "{stage}");
        }
    }
}
