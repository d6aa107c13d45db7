//! # Block Allocator - On-disk space allocation for a single backing file
//!
//! `block-allocator` decides where in a storage engine's file each block
//! lives. It keeps every allocated extent as an `(offset, size)` pair in one
//! offset-sorted array and answers "where can I put N bytes" with a
//! first-fit search over the gaps between them.
//!
//! - **Reserved header** region at the start of the file, never allocated
//! - **Aligned offsets** for every block
//! - **Bulk placement** to rebuild the allocator from an existing layout
//! - **Fragmentation report** over the gaps in the file
//!
//! The allocator does no I/O and is not persisted. It is rebuilt from the
//! block list the engine already tracks.
//!
//! ## Quick Start
//!
//! ```rust
//! use block_allocator::{BlockAllocator, FileUsage, Result};
//!
//! # fn main() -> Result<()> {
//! // 8KB of headers, 4KB alignment
//! let mut alloc = BlockAllocator::new(8192, 4096)?;
//!
//! let a = alloc.alloc_block(1000)?;
//! let b = alloc.alloc_block(5000)?;
//! assert_eq!((a, b), (8192, 12288));
//!
//! alloc.free_block(a)?;
//!
//! // The freed gap is reused first
//! assert_eq!(alloc.alloc_block(4096)?, 8192);
//!
//! let report = alloc.unused_statistics(&FileUsage {
//!     file_size_bytes: alloc.allocated_limit(),
//!     data_bytes: alloc.n_bytes_in_use(),
//!     checkpoint_bytes_additional: 0,
//! })?;
//! assert_eq!(report.unused_blocks, 0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Rebuilding from an existing file
//!
//! ```rust
//! use block_allocator::{BlockAllocator, BlockPair, Result};
//!
//! # fn main() -> Result<()> {
//! let mut alloc = BlockAllocator::new(4096, 512)?;
//! let mut layout = vec![
//!     BlockPair::new(10240, 300),
//!     BlockPair::new(4096, 1024),
//! ];
//! alloc.alloc_blocks_at(&mut layout)?;
//!
//! assert_eq!(alloc.nth_block_in_layout_order(0), Some(BlockPair::new(0, 4096)));
//! assert_eq!(alloc.nth_block_in_layout_order(1), Some(BlockPair::new(4096, 1024)));
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────┬─────────┬─────┬─────────┬───────────┬─────────┐
//! │ reserve      │ block   │ gap │ block   │ gap       │ block   │
//! │ [0, reserve) │ aligned │     │ aligned │ (unused)  │ aligned │
//! └──────────────┴─────────┴─────┴─────────┴───────────┴─────────┘
//!                                                       allocated_limit ┘
//! ```

pub mod core;

pub(crate) use crate::core::{allocator, config, error};

pub use crate::core::{
    allocator::{
        merge_block_pairs_into, BlockAllocator, BlockPair, FileUsage, FragmentationReport,
        SharedBlockAllocator,
    },
    config::{AllocatorConfig, DEFAULT_ALIGNMENT, DEFAULT_RESERVE_AT_BEGINNING, HEADER_RESERVE},
    error::{AllocatorError, Result},
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
