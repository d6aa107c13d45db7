use std::collections::TryReserveError;

use thiserror::Error;

/// Errors raised by the block allocator
///
/// Apart from the configuration variants, every error here means the caller
/// misused the allocator or replayed a corrupted layout. An instance that
/// returned a fatal error must not be trusted for further placement.
#[derive(Error, Debug)]
pub enum AllocatorError {
    #[error("Invalid alignment: {0} (must be nonzero)")]
    InvalidAlignment(u64),

    #[error("Block size must be nonzero")]
    ZeroSizedBlock,

    #[error("No block starts at offset {0}")]
    BlockNotFound(u64),

    #[error("Block offset {offset} lies inside the reserved header region (reserve = {reserve})")]
    OffsetBelowReserve { offset: u64, reserve: u64 },

    #[error("Block offset {offset} is not a multiple of alignment {alignment}")]
    MisalignedOffset { offset: u64, alignment: u64 },

    #[error("Block offset {0} is already allocated")]
    DuplicateOffset(u64),

    #[error("Address arithmetic overflowed u64")]
    AddressOverflow,

    #[error("Byte accounting mismatch: tracked {tracked}, computed {computed}")]
    AccountingMismatch { tracked: u64, computed: u64 },

    #[error("Corrupted block layout: {0}")]
    CorruptedLayout(String),

    #[error("Failed to grow block array: {0}")]
    OutOfMemory(#[from] TryReserveError),

    #[error("Invalid allocator configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AllocatorError {
    /// Whether the allocator that produced this error must be discarded
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AllocatorError::InvalidAlignment(_)
                | AllocatorError::InvalidConfig(_)
                | AllocatorError::ConfigParse(_)
                | AllocatorError::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AllocatorError>;
