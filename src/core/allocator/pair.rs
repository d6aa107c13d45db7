//! Block pairs and the in-place sorted merge used by bulk placement

use crate::error::{AllocatorError, Result};
use serde::{Deserialize, Serialize};

/// One allocated extent `[offset, offset + size)` of the backing file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPair {
    /// Byte offset into the file
    pub offset: u64,
    /// Length in bytes
    pub size: u64,
}

impl BlockPair {
    pub fn new(offset: u64, size: u64) -> Self {
        BlockPair { offset, size }
    }

    /// First byte past the end of this extent
    pub fn end(&self) -> Result<u64> {
        self.offset
            .checked_add(self.size)
            .ok_or(AllocatorError::AddressOverflow)
    }

    /// Check if this extent contains a byte offset
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.offset && offset - self.offset < self.size
    }
}

/// Merge a sorted batch into the sorted front of a buffer, in place
///
/// `dst` holds `d` sorted pairs at its front followed by `src.len()` spare
/// slots. The merge runs from the tail backward: the write cursor always
/// sits at or past the read cursor into `dst`, so no unread pair is
/// overwritten and no scratch buffer is needed.
///
/// On equal offsets the `src` pair lands after the `dst` pair. Callers
/// reject equal offsets before merging.
///
/// # Panics
///
/// Panics if `dst.len() != d + src.len()`.
pub fn merge_block_pairs_into(dst: &mut [BlockPair], d: usize, src: &[BlockPair]) {
    assert_eq!(
        dst.len(),
        d + src.len(),
        "merge buffer must hold exactly both runs"
    );

    let mut d = d;
    let mut s = src.len();
    let mut tail = d + s;

    while d > 0 && s > 0 {
        tail -= 1;
        if dst[d - 1].offset > src[s - 1].offset {
            dst[tail] = dst[d - 1];
            d -= 1;
        } else {
            dst[tail] = src[s - 1];
            s -= 1;
        }
    }

    // Leftover dst pairs are already in their final slots (tail == d)
    while s > 0 {
        tail -= 1;
        dst[tail] = src[s - 1];
        s -= 1;
    }
}
