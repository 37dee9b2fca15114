//! Integer lookup tables for ridge extraction and radius reconstruction.
//!
//! - [`isqrt_below`] and [`SqrtTable`]: largest integer whose square is
//!   strictly below a value, the discrete half-width of a sphere row.
//! - [`CircleFitTable`]: for each squared radius, the largest squared radius
//!   whose discretized disk fits inside it.
//! - [`DanielssonTables`]: for each squared radius `R²` and each neighbor
//!   offset class, the largest squared radius of a sphere centered at the
//!   offset that still fits inside the sphere of `R²` at the origin.
//!
//! The Danielsson tables grow on demand and can be cached on disk as three
//! files of big-endian 32-bit integers.

// Squared radii are bounded by i32::MAX before any table is built.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{CacheMiss, ThicknessError, ThicknessResult};
use crate::parallel::ParallelForEach;
use crate::progress::{ProgressCounter, ProgressSink, Stage};

/// Largest integer whose square is strictly less than `n`, or -1 if `n <= 0`.
///
/// # Example
///
/// ```
/// use voxel_thickness::isqrt_below;
///
/// assert_eq!(isqrt_below(0), -1);
/// assert_eq!(isqrt_below(1), 0);
/// assert_eq!(isqrt_below(4), 1);
/// assert_eq!(isqrt_below(5), 2);
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn isqrt_below(n: i64) -> i64 {
    if n <= 0 {
        return -1;
    }
    let mut r = (n as f64).sqrt() as i64;
    while r * r >= n {
        r -= 1;
    }
    while (r + 1) * (r + 1) < n {
        r += 1;
    }
    r
}

/// Memoized [`isqrt_below`] for `0..=max`.
#[derive(Debug, Clone, Default)]
pub struct SqrtTable {
    values: Vec<i32>,
}

impl SqrtTable {
    /// Builds the table for every value in `0..=max`.
    #[must_use]
    pub fn new(max: i64) -> Self {
        let len = usize::try_from(max.max(0)).map_or(0, |m| m + 1);
        let mut values = Vec::with_capacity(len);
        let mut root: i64 = -1;
        for n in 0..len as i64 {
            while (root + 1) * (root + 1) < n {
                root += 1;
            }
            values.push(root as i32);
        }
        Self { values }
    }

    /// [`isqrt_below`] of `n`, from the table when covered.
    #[must_use]
    pub fn get(&self, n: i64) -> i64 {
        usize::try_from(n)
            .ok()
            .and_then(|i| self.values.get(i))
            .map_or_else(|| isqrt_below(n), |&v| i64::from(v))
    }

    /// Largest value covered by the table, or -1 when empty.
    #[must_use]
    pub fn max(&self) -> i64 {
        self.values.len() as i64 - 1
    }
}

/// Returns `true` if the discretized disk of squared radius `r1_sq` fits in
/// the one of `r2_sq`, both centered on the same pixel.
///
/// # Example
///
/// ```
/// use voxel_thickness::circle_fits;
///
/// // Squared radii 3 and 4 cover the same pixels.
/// assert!(circle_fits(4, 3));
/// assert!(!circle_fits(5, 3));
/// ```
#[must_use]
pub fn circle_fits(r1_sq: i64, r2_sq: i64) -> bool {
    if r1_sq == r2_sq {
        return true;
    }
    let r1 = isqrt_below(r1_sq);
    let r2 = isqrt_below(r2_sq);
    if r1 != r2 {
        return r1 < r2;
    }
    (0..=r1).all(|x| isqrt_below(r1_sq - x * x) <= isqrt_below(r2_sq - x * x))
}

/// For each squared radius `r²`, the largest squared radius found by growing
/// from `r²` while its disk still fits in the disk of `r²`.
///
/// `fits(a, b)` then reduces to `a <= table[b]`.
#[derive(Debug, Clone, Default)]
pub struct CircleFitTable {
    largest: Vec<i64>,
}

impl CircleFitTable {
    /// Builds the table for every squared radius in `0..=max_r2`.
    ///
    /// # Errors
    ///
    /// Returns [`ThicknessError::Interrupted`] if cancelled.
    pub fn new(max_r2: i64, pool: &ParallelForEach) -> ThicknessResult<Self> {
        let len = usize::try_from(max_r2.max(0)).map_or(0, |m| m + 1);
        let mut largest = vec![0i64; len];
        pool.for_each_chunk_mut(&mut largest, 1, |r2, slot| {
            let r2 = r2 as i64;
            let mut grown = r2;
            while circle_fits(grown + 1, r2) {
                grown += 1;
            }
            slot[0] = grown;
            Ok(())
        })?;
        debug!(max_r2, "Built circle-fit table");
        Ok(Self { largest })
    }

    /// Returns `true` if the disk of `r1_sq` fits inside the disk of `r2_sq`.
    #[must_use]
    pub fn fits(&self, r1_sq: i64, r2_sq: i64) -> bool {
        usize::try_from(r2_sq)
            .ok()
            .and_then(|i| self.largest.get(i))
            .map_or_else(|| circle_fits(r1_sq, r2_sq), |&limit| r1_sq <= limit)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.largest.len()
    }

    /// Returns `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.largest.is_empty()
    }
}

/// Neighbor offset class of a 26-neighborhood.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeighborClass {
    /// One nonzero offset component, `(1, 0, 0)`.
    Face,
    /// Two nonzero offset components, `(1, 1, 0)`.
    Edge,
    /// Three nonzero offset components, `(1, 1, 1)`.
    Corner,
}

impl NeighborClass {
    /// All classes, in table order.
    pub const ALL: [Self; 3] = [Self::Face, Self::Edge, Self::Corner];

    /// Class of the offset `(dx, dy, dz)`, or `None` for the zero offset.
    #[must_use]
    pub fn of_offset(dx: i32, dy: i32, dz: i32) -> Option<Self> {
        match [dx, dy, dz].iter().filter(|&&d| d != 0).count() {
            1 => Some(Self::Face),
            2 => Some(Self::Edge),
            3 => Some(Self::Corner),
            _ => None,
        }
    }

    /// Canonical center offset of the class.
    #[must_use]
    pub const fn offset(self) -> [i64; 3] {
        match self {
            Self::Face => [1, 0, 0],
            Self::Edge => [1, 1, 0],
            Self::Corner => [1, 1, 1],
        }
    }

    /// Cache file number, 1 to 3.
    const fn file_number(self) -> usize {
        match self {
            Self::Face => 1,
            Self::Edge => 2,
            Self::Corner => 3,
        }
    }
}

/// Returns `true` if `n` is a sum of three integer squares.
///
/// Legendre: exactly the numbers not of the form `4^a (8b + 7)`.
#[must_use]
pub fn is_sum_of_three_squares(n: i64) -> bool {
    if n < 0 {
        return false;
    }
    let mut m = n;
    while m != 0 && m % 4 == 0 {
        m /= 4;
    }
    m % 8 != 7
}

/// Returns `true` if the sphere of `candidate` centered at `offset` fits in
/// the sphere of `r2` centered at the origin.
fn sphere_fits(candidate: i64, r2: i64, offset: [i64; 3], sqrt: &SqrtTable) -> bool {
    let [cx, cy, cz] = offset;
    let size = isqrt_below(r2) + 2;
    for z in 0..size {
        for y in 0..size {
            let outer = sqrt.get(r2 - y * y - z * z);
            let rest = candidate - (y - cy) * (y - cy) - (z - cz) * (z - cz);
            if rest >= 0 && sqrt.get(rest) + cx > outer {
                return false;
            }
        }
    }
    true
}

/// Largest radius of `smaller` (ascending valid squared radii below `r2`)
/// whose sphere centered at `offset` fits in `r2`, or 0.
fn largest_fitting(r2: i64, offset: [i64; 3], smaller: &[i64], sqrt: &SqrtTable) -> i64 {
    // Fitting is monotone in the candidate radius.
    let fitting = smaller.partition_point(|&candidate| sphere_fits(candidate, r2, offset, sqrt));
    if fitting == 0 {
        0
    } else {
        smaller[fitting - 1]
    }
}

/// Sphere-in-sphere lookup tables for the three neighbor classes.
///
/// Entry `R²` of a class holds the largest squared radius of a sphere that
/// fits inside the sphere of `R²` when shifted by the class offset, or -1
/// when `R²` is not a sum of three squares.
///
/// # Example
///
/// ```
/// use voxel_thickness::{DanielssonTables, NeighborClass, NoProgress, ParallelForEach};
///
/// let pool = ParallelForEach::new(Some(2)).unwrap();
/// let tables = DanielssonTables::compute(16, &pool, &NoProgress).unwrap();
/// assert_eq!(tables.lookup(NeighborClass::Face, 9), 4);
/// assert_eq!(tables.lookup(NeighborClass::Face, 7), -1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DanielssonTables {
    face: Vec<i32>,
    edge: Vec<i32>,
    corner: Vec<i32>,
}

impl DanielssonTables {
    /// Computes tables covering every squared radius in `0..=max_r2`.
    ///
    /// # Errors
    ///
    /// Returns [`ThicknessError::CapacityExceeded`] for `max_r2` beyond
    /// `i32::MAX` and [`ThicknessError::Interrupted`] if cancelled.
    pub fn compute(
        max_r2: i64,
        pool: &ParallelForEach,
        progress: &dyn ProgressSink,
    ) -> ThicknessResult<Self> {
        let mut tables = Self::default();
        tables.expand(max_r2, pool, progress)?;
        Ok(tables)
    }

    /// Number of squared radii covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.face.len()
    }

    /// Returns `true` if no squared radius is covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.face.is_empty()
    }

    /// Returns `true` if the tables cover every squared radius up to `max_r2`.
    #[must_use]
    pub fn covers(&self, max_r2: i64) -> bool {
        usize::try_from(max_r2).is_ok_and(|m| m < self.len())
    }

    fn table(&self, class: NeighborClass) -> &[i32] {
        match class {
            NeighborClass::Face => &self.face,
            NeighborClass::Edge => &self.edge,
            NeighborClass::Corner => &self.corner,
        }
    }

    /// Entry `r2` of the table for `class`; -1 when not covered.
    #[must_use]
    pub fn lookup(&self, class: NeighborClass, r2: i64) -> i64 {
        usize::try_from(r2)
            .ok()
            .and_then(|i| self.table(class).get(i))
            .map_or(-1, |&v| i64::from(v))
    }

    /// Grows the tables to cover every squared radius in `0..=max_r2`.
    ///
    /// Existing entries are kept; only the missing ones are computed.
    ///
    /// # Errors
    ///
    /// Returns [`ThicknessError::CapacityExceeded`] for `max_r2` beyond
    /// `i32::MAX` and [`ThicknessError::Interrupted`] if cancelled.
    pub fn expand(
        &mut self,
        max_r2: i64,
        pool: &ParallelForEach,
        progress: &dyn ProgressSink,
    ) -> ThicknessResult<()> {
        if self.covers(max_r2) || max_r2 < 0 {
            return Ok(());
        }
        if max_r2 > i64::from(i32::MAX) - 1 {
            return Err(ThicknessError::capacity_exceeded(format!(
                "squared radius {max_r2} exceeds the table range"
            )));
        }
        let start = self.len();
        let len = max_r2 as usize + 1;
        info!(from = start, to = len, "Expanding ridge tables");

        let valid: Vec<i64> = (0..len as i64).filter(|&n| is_sum_of_three_squares(n)).collect();
        let sqrt = SqrtTable::new(max_r2);
        let counter = ProgressCounter::new(progress, Stage::Tables, (len - start) as u64);

        let mut entries = vec![[-1i32; 3]; len - start];
        pool.for_each_chunk_mut(&mut entries, 1, |offset, slot| {
            let r2 = (start + offset) as i64;
            if is_sum_of_three_squares(r2) {
                let smaller = &valid[..valid.partition_point(|&v| v < r2)];
                slot[0] = NeighborClass::ALL
                    .map(|class| largest_fitting(r2, class.offset(), smaller, &sqrt) as i32);
            }
            counter.add(1);
            Ok(())
        })?;

        for [face, edge, corner] in entries {
            self.face.push(face);
            self.edge.push(edge);
            self.corner.push(corner);
        }
        Ok(())
    }

    /// Path of the cache file for `class` inside `dir`.
    #[must_use]
    pub fn cache_path(dir: &Path, class: NeighborClass) -> PathBuf {
        dir.join(format!("danielsson_table_{}.dat", class.file_number()))
    }

    /// Loads cached tables from `dir`.
    ///
    /// # Errors
    ///
    /// Returns the [`CacheMiss`] explaining why the cache cannot be used.
    pub fn load(dir: &Path) -> Result<Self, CacheMiss> {
        let [face, edge, corner] =
            NeighborClass::ALL.map(|class| read_table(&Self::cache_path(dir, class)));
        let (face, edge, corner) = (face?, edge?, corner?);
        if face.len() != edge.len() || face.len() != corner.len() {
            return Err(CacheMiss::Inconsistent);
        }
        Ok(Self { face, edge, corner })
    }

    /// Writes the tables to `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error.
    pub fn save(&self, dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(dir)?;
        for class in NeighborClass::ALL {
            let mut out = BufWriter::new(File::create(Self::cache_path(dir, class))?);
            for value in self.table(class) {
                out.write_all(&value.to_be_bytes())?;
            }
            out.flush()?;
        }
        Ok(())
    }

    /// Returns tables covering `max_r2`, from the cache in `cache_dir` when
    /// possible.
    ///
    /// Cached tables that are too small are expanded and written back. A
    /// failed save is logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ThicknessError::CapacityExceeded`] for `max_r2` beyond
    /// `i32::MAX` and [`ThicknessError::Interrupted`] if cancelled.
    pub fn obtain(
        max_r2: i64,
        cache_dir: Option<&Path>,
        pool: &ParallelForEach,
        progress: &dyn ProgressSink,
    ) -> ThicknessResult<Self> {
        let Some(dir) = cache_dir else {
            return Self::compute(max_r2, pool, progress);
        };

        let mut tables = match Self::load(dir) {
            Ok(tables) if tables.covers(max_r2) => {
                debug!(path = %dir.display(), len = tables.len(), "Ridge table cache hit");
                return Ok(tables);
            }
            Ok(tables) => {
                debug!(len = tables.len(), miss = %CacheMiss::TooSmall, "Ridge table cache miss");
                tables
            }
            Err(miss) => {
                debug!(%miss, "Ridge table cache miss");
                Self::default()
            }
        };

        tables.expand(max_r2, pool, progress)?;
        if let Err(e) = tables.save(dir) {
            warn!(path = %dir.display(), error = %e, "Failed to save ridge table cache");
        }
        Ok(tables)
    }
}

/// Reads big-endian `i32` entries up to the end of the file. A trailing
/// partial entry is ignored.
fn read_table(path: &Path) -> Result<Vec<i32>, CacheMiss> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CacheMiss::Missing,
        _ => CacheMiss::Unreadable,
    })?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;

    fn pool() -> ParallelForEach {
        ParallelForEach::new(Some(3)).unwrap()
    }

    #[test]
    fn test_isqrt_below_is_strict() {
        for n in 1..2000i64 {
            let r = isqrt_below(n);
            assert!(r * r < n, "n = {n}");
            assert!((r + 1) * (r + 1) >= n, "n = {n}");
        }
        assert_eq!(isqrt_below(-5), -1);
        assert_eq!(isqrt_below(1 << 40), (1 << 20) - 1);
    }

    #[test]
    fn test_sqrt_table_matches_function() {
        let table = SqrtTable::new(500);
        assert_eq!(table.max(), 500);
        for n in -3..600 {
            assert_eq!(table.get(n), isqrt_below(n), "n = {n}");
        }
    }

    #[test]
    fn test_circle_fit_table_prefix() {
        let table = CircleFitTable::new(30, &pool()).unwrap();
        let expected: [i64; 31] = [
            0, 1, 2, 4, 4, 5, 8, 8, 8, 9, 10, 13, 13, 13, 16, 16, 16, 17, 18, 20, 20, 25, 25, 25,
            25, 25, 26, 29, 29, 29, 32,
        ];
        assert_eq!(table.largest, expected);
        assert!(table.fits(4, 3));
        assert!(!table.fits(5, 3));
        // Beyond the table falls back to direct evaluation.
        assert_eq!(table.fits(1000, 999), circle_fits(1000, 999));
    }

    #[test]
    fn test_sum_of_three_squares() {
        let invalid: Vec<i64> = (0..40).filter(|&n| !is_sum_of_three_squares(n)).collect();
        assert_eq!(invalid, vec![7, 15, 23, 28, 31, 39]);
    }

    #[test]
    fn test_known_table_values() {
        let tables = DanielssonTables::compute(16, &pool(), &NoProgress).unwrap();
        assert_eq!(tables.len(), 17);
        assert_eq!(tables.lookup(NeighborClass::Face, 2), 1);
        assert_eq!(tables.lookup(NeighborClass::Face, 4), 1);
        assert_eq!(tables.lookup(NeighborClass::Face, 9), 4);
        assert_eq!(tables.lookup(NeighborClass::Edge, 5), 1);
        assert_eq!(tables.lookup(NeighborClass::Edge, 9), 3);
        assert_eq!(tables.lookup(NeighborClass::Corner, 6), 1);
        assert_eq!(tables.lookup(NeighborClass::Corner, 15), -1);
        assert_eq!(tables.lookup(NeighborClass::Face, 100), -1);
    }

    #[test]
    fn test_tables_monotone_over_valid_radii() {
        let tables = DanielssonTables::compute(200, &pool(), &NoProgress).unwrap();
        for class in NeighborClass::ALL {
            let values: Vec<i64> = (0..=200)
                .filter(|&n| is_sum_of_three_squares(n))
                .map(|n| tables.lookup(class, n))
                .collect();
            assert!(values.windows(2).all(|w| w[0] <= w[1]), "{class:?}");
        }
    }

    #[test]
    fn test_expand_matches_direct_computation() {
        let mut grown = DanielssonTables::compute(20, &pool(), &NoProgress).unwrap();
        grown.expand(60, &pool(), &NoProgress).unwrap();
        let direct = DanielssonTables::compute(60, &pool(), &NoProgress).unwrap();
        assert_eq!(grown, direct);
    }

    #[test]
    fn test_cache_round_trip_and_misses() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(DanielssonTables::load(dir.path()), Err(CacheMiss::Missing));

        let tables = DanielssonTables::obtain(30, Some(dir.path()), &pool(), &NoProgress).unwrap();
        let loaded = DanielssonTables::load(dir.path()).unwrap();
        assert_eq!(loaded, tables);

        // Cached entries are big-endian.
        let face_path = DanielssonTables::cache_path(dir.path(), NeighborClass::Face);
        let bytes = std::fs::read(face_path).unwrap();
        assert_eq!(bytes.len(), 31 * 4);
        assert_eq!(&bytes[9 * 4..10 * 4], &4i32.to_be_bytes());

        // A larger request grows and rewrites the cache.
        let grown = DanielssonTables::obtain(50, Some(dir.path()), &pool(), &NoProgress).unwrap();
        assert!(grown.covers(50));
        assert_eq!(DanielssonTables::load(dir.path()).unwrap().len(), 51);
    }

    #[test]
    fn test_inconsistent_cache_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tables = DanielssonTables::compute(10, &pool(), &NoProgress).unwrap();
        tables.save(dir.path()).unwrap();
        std::fs::write(
            DanielssonTables::cache_path(dir.path(), NeighborClass::Edge),
            [0u8; 6],
        )
        .unwrap();
        assert_eq!(DanielssonTables::load(dir.path()), Err(CacheMiss::Inconsistent));

        let recomputed =
            DanielssonTables::obtain(10, Some(dir.path()), &pool(), &NoProgress).unwrap();
        assert_eq!(recomputed, tables);
    }

    #[test]
    fn test_trailing_partial_entry_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let tables = DanielssonTables::compute(12, &pool(), &NoProgress).unwrap();
        tables.save(dir.path()).unwrap();
        for class in NeighborClass::ALL {
            let path = DanielssonTables::cache_path(dir.path(), class);
            let mut bytes = std::fs::read(&path).unwrap();
            bytes.extend_from_slice(&[0x7F, 0x01, 0x02]);
            std::fs::write(&path, bytes).unwrap();
        }
        assert_eq!(DanielssonTables::load(dir.path()).unwrap(), tables);
    }

    #[test]
    fn test_neighbor_class_of_offset() {
        assert_eq!(NeighborClass::of_offset(0, 0, 0), None);
        assert_eq!(NeighborClass::of_offset(0, -1, 0), Some(NeighborClass::Face));
        assert_eq!(NeighborClass::of_offset(1, 0, -1), Some(NeighborClass::Edge));
        assert_eq!(NeighborClass::of_offset(-1, 1, 1), Some(NeighborClass::Corner));
    }
}
