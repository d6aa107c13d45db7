//! Offset-based block allocator for a single backing file
//!
//! Tracks every allocated extent as a `(offset, size)` pair in one sorted
//! array. Free space is implicit: it is whatever lies between neighbouring
//! pairs. New blocks are placed first-fit, existing layouts are replayed in
//! bulk through [`BlockAllocator::alloc_blocks_at`].
//!
//! The allocator only does bookkeeping. Reading and writing the file at the
//! returned offsets, and making the file at least
//! [`BlockAllocator::allocated_limit`] bytes long, is up to the caller.

pub mod pair;
pub mod shared;
pub mod stats;

use std::fmt;

use crate::config::AllocatorConfig;
use crate::error::{AllocatorError, Result};
use tracing::{debug, error, trace, warn};

pub use pair::{merge_block_pairs_into, BlockPair};
pub use shared::SharedBlockAllocator;
pub use stats::{FileUsage, FragmentationReport};

/// First-fit allocator over a sorted array of block pairs
///
/// Layout invariants, checked by [`validate`](Self::validate) after every
/// mutation in debug builds:
/// - pairs are strictly increasing by offset
/// - no pair overlaps the next one
/// - `n_bytes_in_use == reserve_at_beginning + Σ size`
///
/// Not synchronized; see [`SharedBlockAllocator`] for a locked handle.
#[derive(Debug, Clone)]
pub struct BlockAllocator {
    /// Header region `[0, reserve_at_beginning)`, never handed out
    reserve_at_beginning: u64,

    /// Every allocated offset is a multiple of this
    alignment: u64,

    /// Allocated extents, sorted by offset
    blocks: Vec<BlockPair>,

    /// Reserve plus the size of every tracked block
    n_bytes_in_use: u64,
}

impl BlockAllocator {
    /// Create an empty allocator
    ///
    /// # Errors
    ///
    /// Returns `InvalidAlignment` if `alignment` is zero, or `OutOfMemory`
    /// if the initial block array cannot be reserved.
    pub fn new(reserve_at_beginning: u64, alignment: u64) -> Result<Self> {
        if alignment == 0 {
            return Err(AllocatorError::InvalidAlignment(alignment));
        }

        let mut blocks = Vec::new();
        blocks.try_reserve_exact(1)?;

        let allocator = BlockAllocator {
            reserve_at_beginning,
            alignment,
            blocks,
            n_bytes_in_use: reserve_at_beginning,
        };
        allocator.check_invariants()?;
        Ok(allocator)
    }

    /// Create an allocator from a validated configuration
    pub fn from_config(config: &AllocatorConfig) -> Result<Self> {
        config.validate()?;
        Self::new(config.reserve_at_beginning, config.alignment)
    }

    /// Tear the allocator down, handing back its block array
    pub fn into_block_pairs(self) -> Vec<BlockPair> {
        self.blocks
    }

    pub fn reserve_at_beginning(&self) -> u64 {
        self.reserve_at_beginning
    }

    pub fn alignment(&self) -> u64 {
        self.alignment
    }

    /// Allocated blocks in offset order
    pub fn blocks(&self) -> &[BlockPair] {
        &self.blocks
    }

    pub fn n_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Bytes in use, including the reserved header region
    pub fn n_bytes_in_use(&self) -> u64 {
        self.n_bytes_in_use
    }

    /// Number of pairs the block array can hold without growing
    pub fn capacity(&self) -> usize {
        self.blocks.capacity()
    }

    /// Round `value` up to the next multiple of the alignment
    pub fn align_up(&self, value: u64) -> Result<u64> {
        value
            .div_ceil(self.alignment)
            .checked_mul(self.alignment)
            .ok_or(AllocatorError::AddressOverflow)
    }

    /// Check every layout invariant
    ///
    /// # Errors
    ///
    /// `CorruptedLayout` if the array is unsorted or two blocks overlap,
    /// `AccountingMismatch` if the tracked byte count disagrees with the
    /// block sizes.
    pub fn validate(&self) -> Result<()> {
        let mut computed = self.reserve_at_beginning;
        for pair in &self.blocks {
            pair.end()?;
            computed = computed
                .checked_add(pair.size)
                .ok_or(AllocatorError::AddressOverflow)?;
        }

        for (index, window) in self.blocks.windows(2).enumerate() {
            let (prev, next) = (window[0], window[1]);
            if next.offset <= prev.offset {
                error!(index, prev = prev.offset, next = next.offset, "Block array out of order");
                return Err(AllocatorError::CorruptedLayout(format!(
                    "block {} at offset {} does not follow offset {}",
                    index + 1,
                    next.offset,
                    prev.offset
                )));
            }
            if next.offset < prev.end()? {
                error!(index, prev = prev.offset, next = next.offset, "Overlapping blocks");
                return Err(AllocatorError::CorruptedLayout(format!(
                    "block at offset {} (size {}) overlaps block at offset {}",
                    prev.offset, prev.size, next.offset
                )));
            }
        }

        if computed != self.n_bytes_in_use {
            error!(tracked = self.n_bytes_in_use, computed, "Byte accounting drifted");
            return Err(AllocatorError::AccountingMismatch {
                tracked: self.n_bytes_in_use,
                computed,
            });
        }

        Ok(())
    }

    #[inline]
    fn check_invariants(&self) -> Result<()> {
        if cfg!(debug_assertions) {
            self.validate()
        } else {
            Ok(())
        }
    }

    /// Make room for `n_to_add` more pairs
    ///
    /// Grows to `max(capacity * 2, len + n_to_add)`, so single inserts
    /// double the array. Never shrinks.
    fn grow_blocks_array_by(&mut self, n_to_add: usize) -> Result<()> {
        let needed = self
            .blocks
            .len()
            .checked_add(n_to_add)
            .ok_or(AllocatorError::AddressOverflow)?;
        let capacity = self.blocks.capacity();

        if needed > capacity {
            let new_capacity = needed.max(capacity.saturating_mul(2));
            self.blocks
                .try_reserve_exact(new_capacity - self.blocks.len())?;
            debug!(from = capacity, to = self.blocks.capacity(), "Grew block array");
        }

        Ok(())
    }

    /// Index of the block starting exactly at `offset`
    ///
    /// # Errors
    ///
    /// `BlockNotFound` if no tracked block starts there.
    pub fn find_block(&self, offset: u64) -> Result<usize> {
        self.find_index(offset).map_err(|_| {
            warn!(offset, "Lookup of untracked block offset");
            AllocatorError::BlockNotFound(offset)
        })
    }

    /// Place a batch of blocks at offsets the caller already decided
    ///
    /// Used to rebuild the allocator from an existing file layout. The batch
    /// is sorted in place, checked, then merged into the block array in one
    /// pass. Ranges are trusted not to overlap; only equal offsets are
    /// rejected up front, overlap is caught by the debug-build validator.
    ///
    /// # Errors
    ///
    /// Nothing is modified if any pair is zero-sized, starts inside the
    /// reserve, is misaligned, or shares an offset with another block.
    pub fn alloc_blocks_at(&mut self, pairs: &mut [BlockPair]) -> Result<()> {
        self.check_invariants()?;
        if pairs.is_empty() {
            return Ok(());
        }

        pairs.sort_unstable_by_key(|pair| pair.offset);

        let mut added = 0u64;
        for (index, pair) in pairs.iter().enumerate() {
            self.check_placement(pair)?;
            if index > 0 && pairs[index - 1].offset == pair.offset {
                warn!(offset = pair.offset, "Batch places two blocks at one offset");
                return Err(AllocatorError::DuplicateOffset(pair.offset));
            }
            if self.find_index(pair.offset).is_ok() {
                warn!(offset = pair.offset, "Batch reuses an allocated offset");
                return Err(AllocatorError::DuplicateOffset(pair.offset));
            }
            added = added
                .checked_add(pair.size)
                .ok_or(AllocatorError::AddressOverflow)?;
        }
        let n_bytes_in_use = self
            .n_bytes_in_use
            .checked_add(added)
            .ok_or(AllocatorError::AddressOverflow)?;

        self.grow_blocks_array_by(pairs.len())?;
        let d = self.blocks.len();
        self.blocks.resize(d + pairs.len(), BlockPair::default());
        merge_block_pairs_into(&mut self.blocks, d, pairs);
        self.n_bytes_in_use = n_bytes_in_use;

        debug!(
            count = pairs.len(),
            bytes = added,
            n_blocks = self.blocks.len(),
            "Placed blocks at fixed offsets"
        );
        self.check_invariants()
    }

    /// Place one block at a fixed offset
    pub fn alloc_block_at(&mut self, size: u64, offset: u64) -> Result<()> {
        self.alloc_blocks_at(&mut [BlockPair::new(offset, size)])
    }

    /// Allocate `size` bytes in the lowest-offset gap that fits
    ///
    /// Candidates, in order: right after the aligned reserve, the aligned
    /// end of each block (if the next block leaves room), and finally the
    /// aligned end of the last block.
    ///
    /// # Examples
    ///
    /// ```
    /// use block_allocator::BlockAllocator;
    ///
    /// let mut alloc = BlockAllocator::new(4096, 512).unwrap();
    /// let first = alloc.alloc_block(1000).unwrap();
    /// let second = alloc.alloc_block(10).unwrap();
    /// assert_eq!(first, 4096);
    /// assert_eq!(second, 5120);
    ///
    /// alloc.free_block(first).unwrap();
    /// assert_eq!(alloc.alloc_block(100).unwrap(), 4096);
    /// ```
    pub fn alloc_block(&mut self, size: u64) -> Result<u64> {
        if size == 0 {
            return Err(AllocatorError::ZeroSizedBlock);
        }
        self.check_invariants()?;

        let n_bytes_in_use = self
            .n_bytes_in_use
            .checked_add(size)
            .ok_or(AllocatorError::AddressOverflow)?;
        let (index, offset) = self.first_fit(size)?;

        self.grow_blocks_array_by(1)?;
        self.blocks.insert(index, BlockPair::new(offset, size));
        self.n_bytes_in_use = n_bytes_in_use;

        trace!(offset, size, index, "Allocated block");
        self.check_invariants()?;
        Ok(offset)
    }

    /// Pick the insertion index and offset for a new block of `size` bytes
    fn first_fit(&self, size: u64) -> Result<(usize, u64)> {
        let end_of_reserve = self.align_up(self.reserve_at_beginning)?;

        let Some(first) = self.blocks.first() else {
            if end_of_reserve.checked_add(size).is_none() {
                return Err(AllocatorError::AddressOverflow);
            }
            return Ok((0, end_of_reserve));
        };
        if fits_before(end_of_reserve, size, first.offset) {
            return Ok((0, end_of_reserve));
        }

        for (index, window) in self.blocks.windows(2).enumerate() {
            let candidate = self.align_up(window[0].end()?)?;
            if fits_before(candidate, size, window[1].offset) {
                return Ok((index + 1, candidate));
            }
        }

        let last = self.blocks[self.blocks.len() - 1];
        let offset = self.align_up(last.end()?)?;
        if offset.checked_add(size).is_none() {
            return Err(AllocatorError::AddressOverflow);
        }
        Ok((self.blocks.len(), offset))
    }

    /// Release the block starting at `offset`
    ///
    /// The freed range simply becomes part of the gap between its
    /// neighbours; there is no explicit coalescing.
    pub fn free_block(&mut self, offset: u64) -> Result<()> {
        self.check_invariants()?;
        let index = self.find_block(offset)?;
        let size = self.blocks[index].size;

        let n_bytes_in_use = self.n_bytes_in_use.checked_sub(size).ok_or(
            AllocatorError::AccountingMismatch {
                tracked: self.n_bytes_in_use,
                computed: size,
            },
        )?;
        self.blocks.remove(index);
        self.n_bytes_in_use = n_bytes_in_use;

        trace!(offset, size, "Freed block");
        self.check_invariants()
    }

    /// Size of the block starting at `offset`
    pub fn block_size(&self, offset: u64) -> Result<u64> {
        let index = self.find_block(offset)?;
        Ok(self.blocks[index].size)
    }

    /// Smallest file length that holds every allocated block
    ///
    /// With no blocks this is the reserve size.
    pub fn allocated_limit(&self) -> u64 {
        match self.blocks.last() {
            Some(last) => last.offset + last.size,
            None => self.reserve_at_beginning,
        }
    }

    /// The `n`th extent of the file in offset order
    ///
    /// Number 0 is the reserved header `[0, reserve_at_beginning)`, number
    /// `k` is the `k`th allocated block. Returns `None` past the last block.
    pub fn nth_block_in_layout_order(&self, n: usize) -> Option<BlockPair> {
        match n {
            0 => Some(self.reserve_pair()),
            n => self.blocks.get(n - 1).copied(),
        }
    }

    /// Every extent of the file in offset order, reserve first
    pub fn layout(&self) -> impl Iterator<Item = BlockPair> + '_ {
        std::iter::once(self.reserve_pair()).chain(self.blocks.iter().copied())
    }

    fn reserve_pair(&self) -> BlockPair {
        BlockPair::new(0, self.reserve_at_beginning)
    }

    fn find_index(&self, offset: u64) -> std::result::Result<usize, usize> {
        self.blocks.binary_search_by_key(&offset, |pair| pair.offset)
    }

    fn check_placement(&self, pair: &BlockPair) -> Result<()> {
        if pair.size == 0 {
            return Err(AllocatorError::ZeroSizedBlock);
        }
        if pair.offset < self.reserve_at_beginning {
            warn!(offset = pair.offset, "Block placed inside the reserve");
            return Err(AllocatorError::OffsetBelowReserve {
                offset: pair.offset,
                reserve: self.reserve_at_beginning,
            });
        }
        if pair.offset % self.alignment != 0 {
            warn!(offset = pair.offset, alignment = self.alignment, "Misaligned block");
            return Err(AllocatorError::MisalignedOffset {
                offset: pair.offset,
                alignment: self.alignment,
            });
        }
        pair.end()?;
        Ok(())
    }
}

#[inline]
fn fits_before(candidate: u64, size: u64, limit: u64) -> bool {
    candidate
        .checked_add(size)
        .is_some_and(|end| end <= limit)
}

impl fmt::Display for BlockAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, pair) in self.blocks.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}:{}", pair.offset, pair.size)?;
        }
        Ok(())
    }
}
