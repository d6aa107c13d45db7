//! Allocator configuration
//!
//! The reserve size and alignment are fixed for an allocator's lifetime.
//! Engines usually embed this as a table in their own TOML settings.

use crate::error::{AllocatorError, Result};
use serde::{Deserialize, Serialize};

/// Default block alignment (one filesystem page)
pub const DEFAULT_ALIGNMENT: u64 = 4096;

/// Size of one on-disk header copy
pub const HEADER_RESERVE: u64 = 4096;

/// Default reserved region: two header copies, written alternately
pub const DEFAULT_RESERVE_AT_BEGINNING: u64 = HEADER_RESERVE * 2;

/// Construction parameters for a [`BlockAllocator`](crate::BlockAllocator)
///
/// # Examples
///
/// ```
/// use block_allocator::AllocatorConfig;
///
/// let config = AllocatorConfig::from_toml_str("alignment = 512").unwrap();
/// assert_eq!(config.alignment, 512);
/// assert_eq!(config.reserve_at_beginning, 8192);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Bytes at the start of the file that are never allocated
    pub reserve_at_beginning: u64,

    /// Required divisor of every allocated offset
    pub alignment: u64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        AllocatorConfig {
            reserve_at_beginning: DEFAULT_RESERVE_AT_BEGINNING,
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

impl AllocatorConfig {
    /// Parse and validate a TOML table
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: AllocatorConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate all fields
    pub fn validate(&self) -> Result<()> {
        if self.alignment == 0 {
            return Err(AllocatorError::InvalidConfig(
                "alignment must be nonzero".to_string(),
            ));
        }

        // The first block lands at the aligned end of the reserve
        if self
            .reserve_at_beginning
            .checked_next_multiple_of(self.alignment)
            .is_none()
        {
            return Err(AllocatorError::InvalidConfig(format!(
                "reserve_at_beginning {} cannot be aligned to {}",
                self.reserve_at_beginning, self.alignment
            )));
        }

        Ok(())
    }
}
