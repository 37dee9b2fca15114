//! Dense voxel grid storage.

use crate::error::{VoxelError, VoxelResult};
use crate::{Axis, VoxelCoord};

/// A dense 3D lattice of values stored in a single contiguous buffer.
///
/// Voxels are laid out with X varying fastest, then Y, then Z, so the linear
/// index of `(x, y, z)` is `z * width * height + y * width + x`. All three
/// extents are at least 1; a 2D image is a grid with `depth == 1` and a 1D
/// signal additionally has `height == 1`.
///
/// # Example
///
/// ```
/// use voxel_types::{VoxelCoord, VoxelGrid};
///
/// let mut grid: VoxelGrid<f32> = VoxelGrid::new(4, 3, 2).unwrap();
/// grid.set(VoxelCoord::new(3, 2, 1), 5.0).unwrap();
///
/// assert_eq!(grid.len(), 24);
/// assert_eq!(grid.get(VoxelCoord::new(3, 2, 1)), Some(&5.0));
/// assert_eq!(grid.as_slice()[23], 5.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelGrid<T> {
    dimensions: [usize; 3],
    data: Vec<T>,
}

/// Validates dimensions and returns the voxel count.
fn voxel_count(dimensions: [usize; 3]) -> VoxelResult<usize> {
    let [width, height, depth] = dimensions;
    let invalid = VoxelError::InvalidDimensions {
        width,
        height,
        depth,
    };
    let limit = usize::try_from(i32::MAX).unwrap_or(usize::MAX);
    if dimensions.iter().any(|&extent| extent == 0 || extent > limit) {
        return Err(invalid);
    }
    width
        .checked_mul(height)
        .and_then(|area| area.checked_mul(depth))
        .ok_or(invalid)
}

impl<T: Clone> VoxelGrid<T> {
    /// Creates a grid with every voxel set to `value`.
    ///
    /// # Errors
    ///
    /// Returns [`VoxelError::InvalidDimensions`] if any extent is zero or the
    /// voxel count overflows.
    pub fn filled(width: usize, height: usize, depth: usize, value: T) -> VoxelResult<Self> {
        let dimensions = [width, height, depth];
        let count = voxel_count(dimensions)?;
        Ok(Self {
            dimensions,
            data: vec![value; count],
        })
    }
}

impl<T: Clone + Default> VoxelGrid<T> {
    /// Creates a grid with every voxel set to `T::default()`.
    ///
    /// # Errors
    ///
    /// Returns [`VoxelError::InvalidDimensions`] if any extent is zero.
    pub fn new(width: usize, height: usize, depth: usize) -> VoxelResult<Self> {
        Self::filled(width, height, depth, T::default())
    }

    /// Creates a default-valued grid with the given `[width, height, depth]`.
    ///
    /// # Errors
    ///
    /// Returns [`VoxelError::InvalidDimensions`] if any extent is zero.
    pub fn with_dimensions(dimensions: [usize; 3]) -> VoxelResult<Self> {
        Self::new(dimensions[0], dimensions[1], dimensions[2])
    }
}

impl<T> VoxelGrid<T> {
    /// Wraps an existing buffer laid out in X-fastest order.
    ///
    /// # Errors
    ///
    /// Returns [`VoxelError::InvalidDimensions`] for bad extents and
    /// [`VoxelError::SizeMismatch`] if `data.len()` does not match them.
    pub fn from_vec(dimensions: [usize; 3], data: Vec<T>) -> VoxelResult<Self> {
        let expected = voxel_count(dimensions)?;
        if data.len() != expected {
            return Err(VoxelError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dimensions, data })
    }

    /// Extent along X.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.dimensions[0]
    }

    /// Extent along Y.
    #[must_use]
    pub const fn height(&self) -> usize {
        self.dimensions[1]
    }

    /// Extent along Z.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.dimensions[2]
    }

    /// Extents as `[width, height, depth]`.
    #[must_use]
    pub const fn dimensions(&self) -> [usize; 3] {
        self.dimensions
    }

    /// Extent along `axis`.
    #[must_use]
    pub const fn extent(&self, axis: Axis) -> usize {
        self.dimensions[axis.index()]
    }

    /// Number of voxels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false`; grids hold at least one voxel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Number of leading axes that take part in processing.
    ///
    /// A grid is 3-dimensional if `depth > 1`, otherwise 2-dimensional if
    /// `height > 1`, otherwise 1-dimensional if `width > 1`, and
    /// 0-dimensional for a single voxel.
    ///
    /// # Example
    ///
    /// ```
    /// use voxel_types::VoxelGrid;
    ///
    /// assert_eq!(VoxelGrid::<u8>::new(8, 8, 8).unwrap().dimensionality(), 3);
    /// assert_eq!(VoxelGrid::<u8>::new(8, 8, 1).unwrap().dimensionality(), 2);
    /// assert_eq!(VoxelGrid::<u8>::new(8, 1, 1).unwrap().dimensionality(), 1);
    /// assert_eq!(VoxelGrid::<u8>::new(1, 1, 1).unwrap().dimensionality(), 0);
    /// ```
    #[must_use]
    pub const fn dimensionality(&self) -> usize {
        dimensionality_of(self.dimensions)
    }

    /// Returns `true` if `coord` lies inside the grid.
    #[must_use]
    pub fn contains(&self, coord: VoxelCoord) -> bool {
        self.index_of(coord).is_some()
    }

    /// Linear index of `coord`, or `None` if it lies outside the grid.
    #[must_use]
    pub fn index_of(&self, coord: VoxelCoord) -> Option<usize> {
        let x = usize::try_from(coord.x).ok()?;
        let y = usize::try_from(coord.y).ok()?;
        let z = usize::try_from(coord.z).ok()?;
        let [width, height, depth] = self.dimensions;
        if x >= width || y >= height || z >= depth {
            return None;
        }
        Some(linear_index(self.dimensions, x, y, z))
    }

    /// Coordinate of the voxel at linear `index`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub const fn coord_of(&self, index: usize) -> VoxelCoord {
        let [width, height, _] = self.dimensions;
        // Extents are capped at i32::MAX on construction.
        VoxelCoord::new(
            (index % width) as i32,
            ((index / width) % height) as i32,
            (index / (width * height)) as i32,
        )
    }

    /// Value at `coord`, or `None` outside the grid.
    #[must_use]
    pub fn get(&self, coord: VoxelCoord) -> Option<&T> {
        self.index_of(coord).map(|index| &self.data[index])
    }

    /// Mutable value at `coord`, or `None` outside the grid.
    pub fn get_mut(&mut self, coord: VoxelCoord) -> Option<&mut T> {
        self.index_of(coord).map(|index| &mut self.data[index])
    }

    /// Stores `value` at `coord`, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`VoxelError::OutOfBounds`] if `coord` lies outside the grid.
    pub fn set(&mut self, coord: VoxelCoord, value: T) -> VoxelResult<T> {
        let index = self
            .index_of(coord)
            .ok_or(VoxelError::OutOfBounds { coord })?;
        Ok(std::mem::replace(&mut self.data[index], value))
    }

    /// Underlying buffer in X-fastest order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Mutable underlying buffer in X-fastest order.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Consumes the grid and returns its buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Iterates over `(coordinate, value)` pairs in storage order.
    pub fn iter(&self) -> impl Iterator<Item = (VoxelCoord, &T)> + '_ {
        self.data
            .iter()
            .enumerate()
            .map(|(index, value)| (self.coord_of(index), value))
    }

    /// Builds a grid of the same shape by applying `f` to every voxel.
    #[must_use]
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> VoxelGrid<U> {
        VoxelGrid {
            dimensions: self.dimensions,
            data: self.data.iter().map(f).collect(),
        }
    }

    /// Row layout for sweeps along `axis`.
    #[must_use]
    pub const fn rows(&self, axis: Axis) -> RowLayout {
        RowLayout::new(self.dimensions, axis)
    }
}

impl VoxelGrid<f32> {
    /// Converts integer or float samples into a 32-bit float grid.
    ///
    /// Accepts any sample type losslessly convertible to `f32`, which covers
    /// 8-bit and 16-bit images.
    ///
    /// # Errors
    ///
    /// Returns [`VoxelError::SizeMismatch`] if the sample count does not match
    /// the dimensions.
    ///
    /// # Example
    ///
    /// ```
    /// use voxel_types::VoxelGrid;
    ///
    /// let samples: [u16; 4] = [0, 255, 1000, 65535];
    /// let grid = VoxelGrid::from_samples([4, 1, 1], &samples).unwrap();
    /// assert_eq!(grid.as_slice(), &[0.0, 255.0, 1000.0, 65535.0]);
    /// ```
    pub fn from_samples<S>(dimensions: [usize; 3], samples: &[S]) -> VoxelResult<Self>
    where
        S: Copy + Into<f32>,
    {
        Self::from_vec(
            dimensions,
            samples.iter().map(|&sample| sample.into()).collect(),
        )
    }
}

impl VoxelGrid<f32> {
    /// Converts an 8-bit image into a float grid.
    ///
    /// # Errors
    ///
    /// Returns [`VoxelError::SizeMismatch`] if the sample count does not match
    /// the dimensions.
    pub fn from_u8(dimensions: [usize; 3], samples: &[u8]) -> VoxelResult<Self> {
        Self::from_samples(dimensions, samples)
    }

    /// Converts a 16-bit image into a float grid.
    ///
    /// # Errors
    ///
    /// Returns [`VoxelError::SizeMismatch`] if the sample count does not match
    /// the dimensions.
    pub fn from_u16(dimensions: [usize; 3], samples: &[u16]) -> VoxelResult<Self> {
        Self::from_samples(dimensions, samples)
    }
}

/// Dimensionality of a grid with the given extents.
#[must_use]
pub const fn dimensionality_of(dimensions: [usize; 3]) -> usize {
    if dimensions[2] > 1 {
        3
    } else if dimensions[1] > 1 {
        2
    } else if dimensions[0] > 1 {
        1
    } else {
        0
    }
}

/// Linear X-fastest index of `(x, y, z)` in a grid of the given extents.
#[must_use]
pub const fn linear_index(dimensions: [usize; 3], x: usize, y: usize, z: usize) -> usize {
    (z * dimensions[1] + y) * dimensions[0] + x
}

/// Enumerates the 1D rows of a box along one axis.
///
/// Row `n` is addressed by the two remaining axes, the lower-numbered one
/// varying fastest. Works for whole grids and for block-local boxes alike.
///
/// # Example
///
/// ```
/// use voxel_types::{Axis, RowLayout, VoxelCoord};
///
/// let rows = RowLayout::new([4, 3, 2], Axis::Y);
/// assert_eq!(rows.count(), 8);
/// assert_eq!(rows.len(), 3);
/// assert_eq!(rows.stride(), 4);
/// assert_eq!(rows.start(5), VoxelCoord::new(1, 0, 1));
/// assert_eq!(rows.index(5, 2), 12 + 8 + 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLayout {
    dimensions: [usize; 3],
    axis: Axis,
}

impl RowLayout {
    /// Creates a layout for rows along `axis` in a box of `dimensions`.
    #[must_use]
    pub const fn new(dimensions: [usize; 3], axis: Axis) -> Self {
        Self { dimensions, axis }
    }

    /// Axis the rows run along.
    #[must_use]
    pub const fn axis(&self) -> Axis {
        self.axis
    }

    /// Number of voxels in each row.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.dimensions[self.axis.index()]
    }

    /// Returns `true` if rows are empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of rows.
    #[must_use]
    pub const fn count(&self) -> usize {
        let [width, height, depth] = self.dimensions;
        match self.axis {
            Axis::X => height * depth,
            Axis::Y => width * depth,
            Axis::Z => width * height,
        }
    }

    /// Distance in the linear buffer between consecutive row elements.
    #[must_use]
    pub const fn stride(&self) -> usize {
        match self.axis {
            Axis::X => 1,
            Axis::Y => self.dimensions[0],
            Axis::Z => self.dimensions[0] * self.dimensions[1],
        }
    }

    /// Coordinate of the first voxel of row `row`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub const fn start(&self, row: usize) -> VoxelCoord {
        let [width, height, _] = self.dimensions;
        let (x, y, z) = match self.axis {
            Axis::X => (0, row % height, row / height),
            Axis::Y => (row % width, 0, row / width),
            Axis::Z => (row % width, row / width, 0),
        };
        VoxelCoord::new(x as i32, y as i32, z as i32)
    }

    /// Linear index of element `position` of row `row`.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub const fn index(&self, row: usize, position: usize) -> usize {
        let start = self.start(row);
        linear_index(
            self.dimensions,
            start.x as usize,
            start.y as usize,
            start.z as usize,
        ) + position * self.stride()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_zero_extent() {
        let result = VoxelGrid::<f32>::new(4, 0, 2);
        assert!(matches!(
            result,
            Err(VoxelError::InvalidDimensions { height: 0, .. })
        ));
    }

    #[test]
    fn test_from_vec_size_mismatch() {
        let result = VoxelGrid::from_vec([2, 2, 2], vec![0u8; 7]);
        assert!(matches!(
            result,
            Err(VoxelError::SizeMismatch {
                expected: 8,
                actual: 7
            })
        ));
    }

    #[test]
    fn test_index_round_trip() {
        let grid = VoxelGrid::<u8>::new(5, 4, 3).unwrap();
        for index in 0..grid.len() {
            assert_eq!(grid.index_of(grid.coord_of(index)), Some(index));
        }
    }

    #[test]
    fn test_out_of_bounds_access() {
        let mut grid = VoxelGrid::<u8>::new(2, 2, 2).unwrap();
        assert_eq!(grid.get(VoxelCoord::new(-1, 0, 0)), None);
        assert_eq!(grid.get(VoxelCoord::new(0, 2, 0)), None);
        assert!(grid.set(VoxelCoord::new(0, 0, 2), 1).is_err());
    }

    #[test]
    fn test_set_returns_previous() {
        let mut grid = VoxelGrid::filled(2, 2, 1, 7u8).unwrap();
        assert_eq!(grid.set(VoxelCoord::new(1, 1, 0), 9).unwrap(), 7);
        assert_eq!(grid.as_slice(), &[7, 7, 7, 9]);
    }

    #[test]
    fn test_from_u8_samples() {
        let grid = VoxelGrid::from_u8([3, 1, 1], &[0, 1, 255]).unwrap();
        assert_eq!(grid.as_slice(), &[0.0, 1.0, 255.0]);
    }

    #[test]
    fn test_rows_cover_grid_once() {
        let dims = [4, 3, 2];
        for axis in Axis::ALL {
            let rows = RowLayout::new(dims, axis);
            let mut seen = vec![0u8; 24];
            for row in 0..rows.count() {
                for position in 0..rows.len() {
                    seen[rows.index(row, position)] += 1;
                }
            }
            assert!(seen.iter().all(|&count| count == 1), "axis {axis:?}");
        }
    }

    #[test]
    fn test_row_start_has_zero_axis_component() {
        let rows = RowLayout::new([3, 5, 7], Axis::Z);
        for row in 0..rows.count() {
            assert_eq!(rows.start(row).z, 0);
        }
    }

    #[test]
    fn test_map_preserves_shape() {
        let grid = VoxelGrid::filled(3, 2, 1, 2u8).unwrap();
        let doubled = grid.map(|&v| f32::from(v) * 2.0);
        assert_eq!(doubled.dimensions(), [3, 2, 1]);
        assert!(doubled.as_slice().iter().all(|&v| v == 4.0));
    }
}
