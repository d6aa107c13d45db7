//! Unused-space statistics for the backing file

use super::BlockAllocator;
use crate::error::{AllocatorError, Result};
use serde::{Deserialize, Serialize};

/// Caller-supplied view of the file, checked against the allocator's own accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUsage {
    /// Current physical length of the file
    pub file_size_bytes: u64,
    /// Bytes held by live data blocks (including the reserve)
    pub data_bytes: u64,
    /// Bytes held only by the checkpoint in progress
    pub checkpoint_bytes_additional: u64,
}

/// Unused space report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentationReport {
    pub file_size_bytes: u64,
    pub data_bytes: u64,
    pub checkpoint_bytes_additional: u64,
    /// Total bytes in gaps
    pub unused_bytes: u64,
    /// Number of non-empty gaps
    pub unused_blocks: u64,
    /// Size of the largest gap
    pub largest_unused_block: u64,
}

impl FragmentationReport {
    fn for_usage(usage: &FileUsage) -> Self {
        FragmentationReport {
            file_size_bytes: usage.file_size_bytes,
            data_bytes: usage.data_bytes,
            checkpoint_bytes_additional: usage.checkpoint_bytes_additional,
            ..Default::default()
        }
    }

    fn record_gap(&mut self, gap: u64) {
        if gap == 0 {
            return;
        }
        self.unused_bytes += gap;
        self.unused_blocks += 1;
        self.largest_unused_block = self.largest_unused_block.max(gap);
    }

    /// Share of the file lost to gaps (0.0 = none)
    pub fn fragmentation_score(&self) -> f64 {
        if self.file_size_bytes == 0 {
            return 0.0;
        }
        self.unused_bytes as f64 / self.file_size_bytes as f64
    }
}

impl BlockAllocator {
    /// Walk every gap in the file and summarise the unused space
    ///
    /// Gaps are measured after the aligned reserve, between the aligned end
    /// of each block and the next block, and from the aligned end of the
    /// last block up to `file_size_bytes`.
    ///
    /// # Errors
    ///
    /// `AccountingMismatch` if `data_bytes + checkpoint_bytes_additional`
    /// differs from [`n_bytes_in_use`](Self::n_bytes_in_use).
    pub fn unused_statistics(&self, usage: &FileUsage) -> Result<FragmentationReport> {
        let claimed = usage
            .data_bytes
            .checked_add(usage.checkpoint_bytes_additional)
            .ok_or(AllocatorError::AddressOverflow)?;
        if claimed != self.n_bytes_in_use {
            tracing::error!(
                tracked = self.n_bytes_in_use,
                claimed,
                "Caller byte accounting disagrees with allocator"
            );
            return Err(AllocatorError::AccountingMismatch {
                tracked: self.n_bytes_in_use,
                computed: claimed,
            });
        }

        let mut report = FragmentationReport::for_usage(usage);
        let end_of_reserve = self.align_up(self.reserve_at_beginning)?;

        let Some(first) = self.blocks.first() else {
            report.record_gap(usage.file_size_bytes.saturating_sub(end_of_reserve));
            return Ok(report);
        };

        report.record_gap(gap_between(end_of_reserve, first.offset)?);

        for window in self.blocks.windows(2) {
            let end_of_block = self.align_up(window[0].end()?)?;
            report.record_gap(gap_between(end_of_block, window[1].offset)?);
        }

        let last = self.blocks[self.blocks.len() - 1];
        let end_of_last = self.align_up(last.end()?)?;
        report.record_gap(usage.file_size_bytes.saturating_sub(end_of_last));

        Ok(report)
    }
}

fn gap_between(start: u64, next_offset: u64) -> Result<u64> {
    next_offset.checked_sub(start).ok_or_else(|| {
        AllocatorError::CorruptedLayout(format!(
            "block at offset {next_offset} starts before the preceding aligned end {start}"
        ))
    })
}
