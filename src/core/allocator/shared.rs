//! Mutex-guarded handle for allocators shared between threads
//!
//! [`BlockAllocator`] does no locking of its own. Engines that touch one
//! allocator from several threads hold this handle instead; every call
//! takes the lock for its whole duration.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{BlockAllocator, BlockPair, FileUsage, FragmentationReport};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct SharedBlockAllocator {
    inner: Arc<Mutex<BlockAllocator>>,
}

impl SharedBlockAllocator {
    pub fn new(allocator: BlockAllocator) -> Self {
        SharedBlockAllocator {
            inner: Arc::new(Mutex::new(allocator)),
        }
    }

    /// Run `f` with the allocator locked
    ///
    /// Use this to keep several operations atomic with respect to other
    /// holders of the handle.
    pub fn with<R>(&self, f: impl FnOnce(&mut BlockAllocator) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut guard)
    }

    pub fn alloc_block(&self, size: u64) -> Result<u64> {
        self.inner.lock().alloc_block(size)
    }

    pub fn alloc_blocks_at(&self, pairs: &mut [BlockPair]) -> Result<()> {
        self.inner.lock().alloc_blocks_at(pairs)
    }

    pub fn free_block(&self, offset: u64) -> Result<()> {
        self.inner.lock().free_block(offset)
    }

    pub fn block_size(&self, offset: u64) -> Result<u64> {
        self.inner.lock().block_size(offset)
    }

    pub fn allocated_limit(&self) -> u64 {
        self.inner.lock().allocated_limit()
    }

    pub fn n_bytes_in_use(&self) -> u64 {
        self.inner.lock().n_bytes_in_use()
    }

    pub fn unused_statistics(&self, usage: &FileUsage) -> Result<FragmentationReport> {
        self.inner.lock().unused_statistics(usage)
    }

    /// Copy of the current block array
    pub fn snapshot(&self) -> Vec<BlockPair> {
        self.inner.lock().blocks().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_handles_see_same_state() {
        let shared = SharedBlockAllocator::new(BlockAllocator::new(0, 1).unwrap());
        let other = shared.clone();

        let offset = shared.alloc_block(10).unwrap();
        assert_eq!(other.block_size(offset).unwrap(), 10);

        other.free_block(offset).unwrap();
        assert!(shared.snapshot().is_empty());
        assert_eq!(shared.n_bytes_in_use(), 0);
    }

    #[test]
    fn test_with_runs_under_one_lock() {
        let shared = SharedBlockAllocator::new(BlockAllocator::new(0, 8).unwrap());
        let (a, b) = shared.with(|alloc| {
            let a = alloc.alloc_block(8).unwrap();
            let b = alloc.alloc_block(8).unwrap();
            (a, b)
        });
        assert_eq!((a, b), (0, 8));
        assert_eq!(shared.allocated_limit(), 16);
    }
}
