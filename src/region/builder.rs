//! Region Builder
//!
//! Opens or creates a region file and fixes its header layout.

use std::fs::{self, OpenOptions};
use std::iter;
use std::path::PathBuf;

use fs2::FileExt;
use parking_lot::Mutex;
use tracing::debug;

use crate::config::{RegionConfig, SyncStrategy};
use crate::error::{RegionError, Result};
use crate::header::{HeaderEntryProvider, HeaderLayout, SectorMap, MAX_SECTOR_OFFSET};
use crate::key::{Key, KeyProvider, RegionId};
use crate::tracker::SectorTracker;

use super::{Region, RegionState};

/// Builder for [`Region`]
///
/// Meant for the code that pools region files. The header layout (key
/// provider slot count plus every added header entry, in order) must match
/// what the file was created with; nothing on disk records it.
pub struct RegionBuilder<K: Key> {
    directory: Option<PathBuf>,
    region_id: Option<RegionId>,
    key_provider: Option<Box<dyn KeyProvider<K>>>,
    header_providers: Vec<Box<dyn HeaderEntryProvider<K>>>,
    config: RegionConfig,
}

impl<K: Key> Default for RegionBuilder<K> {
    fn default() -> Self {
        Self {
            directory: None,
            region_id: None,
            key_provider: None,
            header_providers: Vec::new(),
            config: RegionConfig::default(),
        }
    }
}

impl<K: Key> RegionBuilder<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory holding the region file (created if missing)
    pub fn directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.directory = Some(path.into());
        self
    }

    /// Region to open; its name is the file name
    pub fn region_id(mut self, region_id: impl Into<RegionId>) -> Self {
        self.region_id = Some(region_id.into());
        self
    }

    /// Slot count and inverse mapping for this key type
    pub fn key_provider(mut self, provider: impl KeyProvider<K> + 'static) -> Self {
        self.key_provider = Some(Box::new(provider));
        self
    }

    /// Replace the whole config
    pub fn config(mut self, config: RegionConfig) -> Self {
        self.config = config;
        self
    }

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

    /// Append a header table after the sector map and any earlier tables
    pub fn add_header_entry(mut self, provider: impl HeaderEntryProvider<K> + 'static) -> Self {
        self.header_providers.push(Box::new(provider));
        self
    }

    /// Open or create the region file
    ///
    /// Steps:
    /// 1. Create the directory and open the file read/write
    /// 2. Take an exclusive lock on it (`AlreadyOpen` only if another
    ///    holder has it; other lock failures surface as `Io`)
    /// 3. Zero-fill the header if the file is new or short
    /// 4. Load the sector map and rebuild the free-list from it
    pub fn build(self) -> Result<Region<K>> {
        self.config.validate()?;

        let directory = self
            .directory
            .ok_or_else(|| RegionError::Config("region directory not set".to_string()))?;
        let region_id = self
            .region_id
            .ok_or_else(|| RegionError::Config("region id not set".to_string()))?;
        let key_provider = self
            .key_provider
            .ok_or_else(|| RegionError::Config("key provider not set".to_string()))?;

        validate_file_name(&region_id)?;

        let slot_count = key_provider.slot_count(&region_id);
        if slot_count == 0 {
            return Err(RegionError::Config(format!(
                "key provider reports no slots for {}",
                region_id
            )));
        }

        // Sector map is always the first table
        let widths = iter::once(SectorMap::ENTRY_BYTES)
            .chain(self.header_providers.iter().map(|p| p.entry_byte_count()));
        let layout = HeaderLayout::new(slot_count, widths);

        let sector_size = self.config.sector_size;
        let header_sectors = layout.sectors(sector_size);
        if header_sectors > MAX_SECTOR_OFFSET as u64 {
            return Err(RegionError::CapacityExceeded(format!(
                "header needs {} sectors, max {}",
                header_sectors, MAX_SECTOR_OFFSET
            )));
        }

        fs::create_dir_all(&directory)?;
        let path = directory.join(region_id.name());

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            if e.kind() == fs2::lock_contended_error().kind() {
                return Err(RegionError::AlreadyOpen(path));
            }
            return Err(e.into());
        }

        let header_bytes = header_sectors * sector_size as u64;
        if file.metadata()?.len() < header_bytes {
            file.set_len(header_bytes)?;
        }

        let sector_map = SectorMap::read_or_create(&mut file, slot_count)?;
        let tracker = SectorTracker::from_sector_map(&sector_map, header_sectors as u32)?;

        debug!(
            region = %region_id,
            path = %path.display(),
            slot_count,
            header_sectors,
            entries = sector_map.present_count(),
            end_sector = tracker.end_sector(),
            "opened region"
        );

        Ok(Region {
            region_id,
            path,
            key_provider,
            header_providers: self.header_providers,
            layout,
            slot_count,
            config: self.config,
            state: Mutex::new(RegionState {
                file,
                sector_map,
                tracker,
            }),
        })
    }
}

/// A region id becomes a file name inside the directory, never a path
fn validate_file_name(region_id: &RegionId) -> Result<()> {
    let name = region_id.name();
    if name.is_empty() || name == "." || name == ".." || name.contains(&['/', '\\', '\0'][..]) {
        return Err(RegionError::InvalidAddress(format!(
            "region id {:?} is not a valid file name",
            name
        )));
    }
    Ok(())
}
