//! Voxel coordinate and axis types.

/// One of the three lattice axes.
///
/// Rows of a grid are always processed along a single axis; `X` is the
/// fastest-varying axis in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    /// Width axis.
    X,
    /// Height axis.
    Y,
    /// Depth axis.
    Z,
}

impl Axis {
    /// All axes in processing order.
    pub const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];

    /// Returns the axis with the given index (0 = X, 1 = Y, 2 = Z).
    ///
    /// # Example
    ///
    /// ```
    /// use voxel_types::Axis;
    ///
    /// assert_eq!(Axis::from_index(1), Some(Axis::Y));
    /// assert_eq!(Axis::from_index(3), None);
    /// ```
    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::X),
            1 => Some(Self::Y),
            2 => Some(Self::Z),
            _ => None,
        }
    }

    /// Returns the index of this axis (0 = X, 1 = Y, 2 = Z).
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

/// A discrete 3D coordinate in voxel space.
///
/// Uses `i32` components so that block-relative offsets may be negative.
///
/// # Example
///
/// ```
/// use voxel_types::{Axis, VoxelCoord};
///
/// let coord = VoxelCoord::new(1, 2, 3);
/// assert_eq!(coord.component(Axis::Z), 3);
/// assert_eq!(coord.with_component(Axis::X, 7), VoxelCoord::new(7, 2, 3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoxelCoord {
    /// X coordinate (width axis).
    pub x: i32,
    /// Y coordinate (height axis).
    pub y: i32,
    /// Z coordinate (depth axis).
    pub z: i32,
}

impl VoxelCoord {
    /// Creates a new voxel coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Creates a coordinate at the origin (0, 0, 0).
    #[must_use]
    pub const fn origin() -> Self {
        Self::new(0, 0, 0)
    }

    /// Returns the component along `axis`.
    #[must_use]
    pub const fn component(self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Returns a copy with the component along `axis` replaced.
    #[must_use]
    pub const fn with_component(self, axis: Axis, value: i32) -> Self {
        match axis {
            Axis::X => Self::new(value, self.y, self.z),
            Axis::Y => Self::new(self.x, value, self.z),
            Axis::Z => Self::new(self.x, self.y, value),
        }
    }

    /// Returns a copy moved by `delta` along `axis`.
    ///
    /// # Example
    ///
    /// ```
    /// use voxel_types::{Axis, VoxelCoord};
    ///
    /// let coord = VoxelCoord::new(4, 4, 4);
    /// assert_eq!(coord.step(Axis::Y, -2), VoxelCoord::new(4, 2, 4));
    /// ```
    #[must_use]
    pub const fn step(self, axis: Axis, delta: i32) -> Self {
        self.with_component(axis, self.component(axis).wrapping_add(delta))
    }

    /// Returns the coordinate as an array `[x, y, z]`.
    #[must_use]
    pub const fn as_array(self) -> [i32; 3] {
        [self.x, self.y, self.z]
    }

    /// Clamps each component into `0..extent` of the matching dimension.
    ///
    /// # Example
    ///
    /// ```
    /// use voxel_types::VoxelCoord;
    ///
    /// let coord = VoxelCoord::new(-3, 12, 4);
    /// assert_eq!(coord.clamp_to([10, 10, 10]), VoxelCoord::new(0, 9, 4));
    /// ```
    #[must_use]
    pub fn clamp_to(self, dimensions: [usize; 3]) -> Self {
        let clamp = |value: i32, extent: usize| {
            let upper = i32::try_from(extent.saturating_sub(1)).unwrap_or(i32::MAX);
            value.clamp(0, upper)
        };
        Self::new(
            clamp(self.x, dimensions[0]),
            clamp(self.y, dimensions[1]),
            clamp(self.z, dimensions[2]),
        )
    }

    /// Checked component-wise addition.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        Some(Self::new(
            self.x.checked_add(other.x)?,
            self.y.checked_add(other.y)?,
            self.z.checked_add(other.z)?,
        ))
    }

    /// Checked component-wise subtraction.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        Some(Self::new(
            self.x.checked_sub(other.x)?,
            self.y.checked_sub(other.y)?,
            self.z.checked_sub(other.z)?,
        ))
    }
}

impl From<[i32; 3]> for VoxelCoord {
    fn from([x, y, z]: [i32; 3]) -> Self {
        Self::new(x, y, z)
    }
}

impl From<VoxelCoord> for [i32; 3] {
    fn from(coord: VoxelCoord) -> Self {
        coord.as_array()
    }
}

impl std::ops::Add for VoxelCoord {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(
            self.x.wrapping_add(other.x),
            self.y.wrapping_add(other.y),
            self.z.wrapping_add(other.z),
        )
    }
}

impl std::ops::Sub for VoxelCoord {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(
            self.x.wrapping_sub(other.x),
            self.y.wrapping_sub(other.y),
            self.z.wrapping_sub(other.z),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_round_trip() {
        for axis in Axis::ALL {
            assert_eq!(Axis::from_index(axis.index()), Some(axis));
        }
    }

    #[test]
    fn test_component_access() {
        let coord = VoxelCoord::new(1, 2, 3);
        assert_eq!(coord.component(Axis::X), 1);
        assert_eq!(coord.component(Axis::Y), 2);
        assert_eq!(coord.component(Axis::Z), 3);
    }

    #[test]
    fn test_step_negative() {
        let coord = VoxelCoord::new(0, 0, 0).step(Axis::Z, -1);
        assert_eq!(coord, VoxelCoord::new(0, 0, -1));
    }

    #[test]
    fn test_clamp_inside_is_identity() {
        let coord = VoxelCoord::new(2, 3, 4);
        assert_eq!(coord.clamp_to([5, 5, 5]), coord);
    }

    #[test]
    fn test_add_sub() {
        let a = VoxelCoord::new(5, 6, 7);
        let b = VoxelCoord::new(1, 2, 3);
        assert_eq!(a - b, VoxelCoord::new(4, 4, 4));
        assert_eq!(a + b, VoxelCoord::new(6, 8, 10));
        assert_eq!(a.checked_sub(b), Some(VoxelCoord::new(4, 4, 4)));
        assert_eq!(VoxelCoord::new(i32::MAX, 0, 0).checked_add(b), None);
    }
}
