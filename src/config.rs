//! Configuration for regionkv
//!
//! Per-region settings with sensible defaults.

use crate::error::{RegionError, Result};

/// Default sector size in bytes
pub const DEFAULT_SECTOR_SIZE: usize = 512;

/// Smallest accepted sector size (must hold the 4-byte length prefix with room to spare)
pub const MIN_SECTOR_SIZE: usize = 16;

/// Largest accepted sector size (1 MiB)
pub const MAX_SECTOR_SIZE: usize = 1024 * 1024;

/// Configuration for a single region file
#[derive(Debug, Clone)]
pub struct RegionConfig {
    // -------------------------------------------------------------------------
    // Layout Configuration
    // -------------------------------------------------------------------------
    /// Size of one sector in bytes. Fixed for the lifetime of a file:
    /// reopening with a different value misreads every offset.
    pub sector_size: usize,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// How often to fsync the region file
    pub sync_strategy: SyncStrategy,
}

/// Sync strategy for region writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// Leave flushing to the OS (and to `Region::sync` / `Region::close`)
    Never,

    /// fdatasync after every write and delete
    EveryWrite,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            sector_size: DEFAULT_SECTOR_SIZE,
            sync_strategy: SyncStrategy::Never,
        }
    }
}

impl RegionConfig {
    /// Create a new config builder
    pub fn builder() -> RegionConfigBuilder {
        RegionConfigBuilder::default()
    }

    /// Check that the settings describe a usable layout
    pub fn validate(&self) -> Result<()> {
        let size = self.sector_size;
        if !size.is_power_of_two() || !(MIN_SECTOR_SIZE..=MAX_SECTOR_SIZE).contains(&size) {
            return Err(RegionError::Config(format!(
                "sector size must be a power of two in [{}, {}], got {}",
                MIN_SECTOR_SIZE, MAX_SECTOR_SIZE, size
            )));
        }
        Ok(())
    }
}

/// Builder for RegionConfig
#[derive(Default)]
pub struct RegionConfigBuilder {
    config: RegionConfig,
}

impl RegionConfigBuilder {
    /// Set the sector size (in bytes)
    pub fn sector_size(mut self, size: usize) -> Self {
        self.config.sector_size = size;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    pub fn build(self) -> RegionConfig {
        self.config
    }
}
