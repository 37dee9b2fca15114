//! Packed record formats for radius reconstruction state.
//!
//! Two packings are used on disk and in memory:
//!
//! - [`SourceRef`]: the (x, y) part of a sphere center, two 16-bit signed
//!   halves packed into 32 bits.
//! - [`BlockRecord`]: a 16-bit block id and a 48-bit byte offset into that
//!   block's data file, packed into 64 bits.
//!
//! ```text
//! SourceRef    bits 31..16 = x (two's complement)   bits 15..0 = y
//! BlockRecord  bits 63..16 = byte offset             bits 15..0 = block id
//! ```

use crate::error::{IoError, IoResult};

/// Largest block id that can be stored in a [`BlockRecord`].
///
/// The id field holds 16 bits, but block files written by other tools treat
/// it as a signed `i16`, so the sign bit stays clear and ids remain
/// non-negative on both sides.
pub const MAX_BLOCK_ID: u16 = 0x7FFF;

/// Largest byte offset that can be stored in a [`BlockRecord`].
pub const MAX_BLOCK_OFFSET: u64 = (1 << 48) - 1;

/// The (x, y) coordinates of a sphere center.
///
/// The z coordinate is implied by the row being processed, so only two
/// components are stored. Both fit in 16 bits because every grid extent is
/// kept below `i16::MAX`.
///
/// # Example
///
/// ```
/// use voxel_io::SourceRef;
///
/// let src = SourceRef::new(-1, 300);
/// assert_eq!(src.pack(), 0xFFFF_012C);
/// assert_eq!(SourceRef::unpack(src.pack()), src);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SourceRef {
    /// X coordinate of the center.
    pub x: i16,
    /// Y coordinate of the center.
    pub y: i16,
}

/// Set of sphere centers affecting one voxel.
pub type RiSet = Box<[SourceRef]>;

impl SourceRef {
    /// Creates a reference from 16-bit components.
    #[must_use]
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }

    /// Creates a reference from 32-bit grid coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::CapacityExceeded`] if either component does not fit
    /// in 16 bits.
    pub fn from_coords(x: i32, y: i32) -> IoResult<Self> {
        let narrow = |v: i32| {
            i16::try_from(v)
                .map_err(|_| IoError::capacity_exceeded(format!("coordinate {v} exceeds 16 bits")))
        };
        Ok(Self::new(narrow(x)?, narrow(y)?))
    }

    /// Packs into 32 bits with x in the high half.
    ///
    /// Each half is reinterpreted as unsigned before shifting, so a negative
    /// y never bleeds into the x half.
    #[must_use]
    #[allow(clippy::cast_sign_loss, clippy::cast_lossless)]
    pub const fn pack(self) -> u32 {
        ((self.x as u16 as u32) << 16) | (self.y as u16 as u32)
    }

    /// Inverse of [`SourceRef::pack`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub const fn unpack(bits: u32) -> Self {
        Self::new((bits >> 16) as u16 as i16, bits as u16 as i16)
    }
}

/// Location of one voxel's center list inside a block data file.
///
/// # Example
///
/// ```
/// use voxel_io::BlockRecord;
///
/// let record = BlockRecord::new(3, 1024).unwrap();
/// assert_eq!(record.encode(), (1024 << 16) | 3);
/// assert_eq!(BlockRecord::decode(record.encode()), record);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockRecord {
    block: u16,
    offset: u64,
}

impl BlockRecord {
    /// Creates a record for `offset` bytes into block `block`'s data file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::CapacityExceeded`] if the block id exceeds
    /// [`MAX_BLOCK_ID`] or the offset exceeds [`MAX_BLOCK_OFFSET`].
    pub fn new(block: u16, offset: u64) -> IoResult<Self> {
        if block > MAX_BLOCK_ID {
            return Err(IoError::capacity_exceeded(format!(
                "block id {block} exceeds {MAX_BLOCK_ID}"
            )));
        }
        if offset > MAX_BLOCK_OFFSET {
            return Err(IoError::capacity_exceeded(format!(
                "block offset {offset} exceeds 48 bits"
            )));
        }
        Ok(Self { block, offset })
    }

    /// Block id.
    #[must_use]
    pub const fn block(&self) -> u16 {
        self.block
    }

    /// Byte offset into the block data file.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    /// Packs into 64 bits with the offset in the high 48 bits.
    #[must_use]
    #[allow(clippy::cast_lossless)]
    pub const fn encode(self) -> u64 {
        (self.offset << 16) | self.block as u64
    }

    /// Inverse of [`BlockRecord::encode`].
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn decode(bits: u64) -> Self {
        Self {
            block: (bits & 0xFFFF) as u16,
            offset: bits >> 16,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_source_ref_x_range_exhaustive() {
        for x in i16::MIN..=i16::MAX {
            let src = SourceRef::new(x, -1);
            assert_eq!(SourceRef::unpack(src.pack()), src);
        }
    }

    #[test]
    fn test_source_ref_y_range_exhaustive() {
        for y in i16::MIN..=i16::MAX {
            let src = SourceRef::new(-1, y);
            assert_eq!(SourceRef::unpack(src.pack()), src);
        }
    }

    #[test]
    fn test_negative_y_keeps_x() {
        let src = SourceRef::new(5, -1);
        assert_eq!(src.pack() >> 16, 5);
        assert_eq!(SourceRef::unpack(src.pack()).x, 5);
    }

    #[test]
    fn test_from_coords_limits() {
        assert!(SourceRef::from_coords(32767, -32768).is_ok());
        assert!(matches!(
            SourceRef::from_coords(32768, 0),
            Err(IoError::CapacityExceeded { .. })
        ));
        assert!(SourceRef::from_coords(0, -32769).is_err());
    }

    #[test]
    fn test_block_record_limits() {
        let record = BlockRecord::new(MAX_BLOCK_ID, MAX_BLOCK_OFFSET).unwrap();
        assert_eq!(BlockRecord::decode(record.encode()), record);
        assert_eq!(record.encode(), 0xFFFF_FFFF_FFFF_7FFF);
        // The low half read back as a signed id stays non-negative.
        assert_eq!(record.encode() as u16 as i16, 0x7FFF);

        assert!(BlockRecord::new(MAX_BLOCK_ID + 1, 0).is_err());
        assert!(BlockRecord::new(0, MAX_BLOCK_OFFSET + 1).is_err());
    }

    #[test]
    fn test_block_record_fields() {
        let record = BlockRecord::decode((77 << 16) | 12);
        assert_eq!(record.block(), 12);
        assert_eq!(record.offset(), 77);
    }
}
