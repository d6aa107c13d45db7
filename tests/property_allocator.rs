//! Property-based tests for allocator correctness
//!
//! Uses proptest to verify allocator invariants hold across many random scenarios

use block_allocator::{BlockAllocator, BlockPair, FileUsage};
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Op {
    Alloc(u64),
    /// Free the live block at this index (modulo the live count)
    Free(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u64..10_000).prop_map(Op::Alloc),
        2 => any::<usize>().prop_map(Op::Free),
    ]
}

/// Non-overlapping aligned pairs above the reserve, in random order
fn layout_strategy(reserve: u64, alignment: u64) -> impl Strategy<Value = Vec<BlockPair>> {
    prop::collection::vec((0u64..4, 1u64..3_000), 1..40)
        .prop_map(move |specs| {
            let mut next = reserve.div_ceil(alignment) * alignment;
            specs
                .into_iter()
                .map(|(skip, size)| {
                    let offset = next + skip * alignment;
                    next = (offset + size).div_ceil(alignment) * alignment;
                    BlockPair::new(offset, size)
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

proptest! {
    #[test]
    fn prop_invariants_hold_under_churn(
        reserve in 0u64..10_000,
        alignment in prop::sample::select(vec![1u64, 8, 100, 512, 4096]),
        ops in prop::collection::vec(op_strategy(), 1..200)
    ) {
        let mut alloc = BlockAllocator::new(reserve, alignment).unwrap();
        let mut live: Vec<(u64, u64)> = Vec::new();

        for op in ops {
            match op {
                Op::Alloc(size) => {
                    let offset = alloc.alloc_block(size).unwrap();
                    prop_assert_eq!(offset % alignment, 0, "misaligned offset {}", offset);
                    prop_assert!(offset >= reserve, "offset {} inside reserve", offset);
                    live.push((offset, size));
                }
                Op::Free(index) => {
                    if live.is_empty() {
                        continue;
                    }
                    let (offset, size) = live.swap_remove(index % live.len());
                    prop_assert_eq!(alloc.block_size(offset).unwrap(), size);
                    alloc.free_block(offset).unwrap();
                }
            }

            let blocks = alloc.blocks();
            for pair in blocks.windows(2) {
                prop_assert!(pair[0].offset + pair[0].size <= pair[1].offset);
            }
            let sum: u64 = live.iter().map(|(_, size)| size).sum();
            prop_assert_eq!(alloc.n_bytes_in_use(), reserve + sum);
            prop_assert_eq!(alloc.n_blocks(), live.len());
        }
    }

    #[test]
    fn prop_alloc_then_free_restores_state(
        sizes in prop::collection::vec(1u64..5_000, 0..50),
        free_mask in prop::collection::vec(any::<bool>(), 50),
        probe in 1u64..20_000
    ) {
        let mut alloc = BlockAllocator::new(4096, 512).unwrap();
        let offsets: Vec<u64> = sizes.iter().map(|&s| alloc.alloc_block(s).unwrap()).collect();
        for (offset, free) in offsets.iter().zip(free_mask) {
            if free {
                alloc.free_block(*offset).unwrap();
            }
        }

        let before = alloc.blocks().to_vec();
        let bytes_before = alloc.n_bytes_in_use();

        let offset = alloc.alloc_block(probe).unwrap();
        alloc.free_block(offset).unwrap();

        prop_assert_eq!(alloc.blocks(), before.as_slice());
        prop_assert_eq!(alloc.n_bytes_in_use(), bytes_before);
    }

    #[test]
    fn prop_bulk_equals_incremental(
        alignment in prop::sample::select(vec![1u64, 64, 4096]),
        pairs in layout_strategy(8192, 4096)
    ) {
        // Layout is generated at 4096 alignment, which every candidate divides
        let mut bulk = BlockAllocator::new(8192, alignment).unwrap();
        bulk.alloc_blocks_at(&mut pairs.clone()).unwrap();

        let mut incremental = BlockAllocator::new(8192, alignment).unwrap();
        for pair in &pairs {
            incremental.alloc_block_at(pair.size, pair.offset).unwrap();
        }

        prop_assert_eq!(bulk.blocks(), incremental.blocks());
        prop_assert_eq!(bulk.n_bytes_in_use(), incremental.n_bytes_in_use());

        let mut expected = pairs.clone();
        expected.sort_by_key(|p| p.offset);
        prop_assert_eq!(bulk.blocks(), expected.as_slice());
    }

    #[test]
    fn prop_no_double_allocation(
        sizes in prop::collection::vec(1u64..64 * 1024, 1..60)
    ) {
        let mut alloc = BlockAllocator::new(0, 4096).unwrap();
        let mut seen = HashSet::new();

        for size in sizes {
            let offset = alloc.alloc_block(size).unwrap();
            prop_assert!(seen.insert(offset), "Offset {} allocated twice!", offset);
        }
    }

    #[test]
    fn prop_unused_statistics_account_for_file(
        pairs in layout_strategy(0, 1),
        slack in 0u64..10_000
    ) {
        let mut alloc = BlockAllocator::new(0, 1).unwrap();
        alloc.alloc_blocks_at(&mut pairs.clone()).unwrap();

        let file_size = alloc.allocated_limit() + slack;
        let report = alloc
            .unused_statistics(&FileUsage {
                file_size_bytes: file_size,
                data_bytes: alloc.n_bytes_in_use(),
                checkpoint_bytes_additional: 0,
            })
            .unwrap();

        // With alignment 1 every byte is either a block or a gap
        prop_assert_eq!(report.unused_bytes + alloc.n_bytes_in_use(), file_size);
        prop_assert!(report.largest_unused_block <= report.unused_bytes);
        prop_assert!(report.unused_blocks <= alloc.n_blocks() as u64 + 1);
    }
}
