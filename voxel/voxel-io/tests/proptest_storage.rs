//! Property-based tests for the on-disk block formats.
//!
//! Run with: cargo test -p voxel-io -- proptest

use proptest::prelude::*;
use voxel_io::{BlockRecord, MAX_BLOCK_ID, MAX_BLOCK_OFFSET, RiBlockFiles, RiSet, SourceRef};
use voxel_types::{Block, VoxelCoord, VoxelGrid};

// =============================================================================
// Strategies
// =============================================================================

fn arb_source_ref() -> impl Strategy<Value = SourceRef> {
    (any::<i16>(), any::<i16>()).prop_map(|(x, y)| SourceRef::new(x, y))
}

fn arb_set() -> impl Strategy<Value = RiSet> {
    prop::collection::vec(arb_source_ref(), 0..6).prop_map(Vec::into_boxed_slice)
}

/// A small grid of center sets together with a split along X into two blocks.
fn arb_split_grid() -> impl Strategy<Value = (VoxelGrid<RiSet>, usize)> {
    (2usize..6, 1usize..4, 1usize..3).prop_flat_map(|(w, h, d)| {
        (
            prop::collection::vec(arb_set(), w * h * d),
            1..w,
        )
            .prop_map(move |(sets, split)| {
                let grid = VoxelGrid::from_vec([w, h, d], sets).unwrap();
                (grid, split)
            })
    })
}

fn sub_grid(grid: &VoxelGrid<RiSet>, block: &Block) -> VoxelGrid<RiSet> {
    let [w, h, d] = block.size();
    let mut out = VoxelGrid::<RiSet>::new(w, h, d).unwrap();
    for index in 0..out.len() {
        let global = block.to_global(out.coord_of(index));
        out.as_mut_slice()[index] = grid.get(global).cloned().unwrap_or_default();
    }
    out
}

// =============================================================================
// Property Tests: Packed records
// =============================================================================

proptest! {
    /// Packing a center and unpacking it returns the same center.
    #[test]
    fn source_ref_packing_is_lossless(src in arb_source_ref()) {
        prop_assert_eq!(SourceRef::unpack(src.pack()), src);
    }

    /// Block id and offset survive encoding for every representable pair.
    #[test]
    fn block_record_is_lossless(block in 0..=MAX_BLOCK_ID, offset in 0..=MAX_BLOCK_OFFSET) {
        let record = BlockRecord::new(block, offset).unwrap();
        let decoded = BlockRecord::decode(record.encode());
        prop_assert_eq!(decoded.block(), block);
        prop_assert_eq!(decoded.offset(), offset);
    }
}

// =============================================================================
// Property Tests: Block files
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Writing a grid as two blocks and reading it back as one returns the
    /// original sets.
    #[test]
    fn split_blocks_reassemble((grid, split) in arb_split_grid()) {
        let dir = tempfile::tempdir().unwrap();
        let dims = grid.dimensions();
        let files = RiBlockFiles::new(dir.path().join("ri_dim0"), dims);

        let left = Block::clamped(VoxelCoord::origin(), [split, dims[1], dims[2]], dims).unwrap();
        let right_origin = VoxelCoord::new(i32::try_from(split).unwrap(), 0, 0);
        let right = Block::clamped(right_origin, dims, dims).unwrap();

        files.write_block(0, &left, &sub_grid(&grid, &left)).unwrap();
        files.write_block(1, &right, &sub_grid(&grid, &right)).unwrap();

        let whole = files.read_block(&Block::whole(dims)).unwrap();
        prop_assert_eq!(whole, grid);
    }
}
