//! Region Module
//!
//! One file holding every entry of one region.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐ sector 0
//! │ Header (see `header` module), padded to whole sectors    │
//! │   sector map table | extra provider tables | padding    │
//! ├─────────────────────────────────────────────────────────┤ sector H
//! │ Entry runs, each a whole number of sectors:             │
//! │   [Len: u32 BE][Payload][zero padding]                  │
//! │ ... runs may be separated by free sectors ...           │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Write Ordering
//! 1. payload into a run nothing on disk points at (unless same-size)
//! 2. extra header records
//! 3. the sector map record, which switches the slot to the new run
//!
//! The slot's old run is only returned to the free-list after step 3. A
//! failure before it undoes the reservation; a failure in step 3 leaks the
//! old run until the next open rebuilds the free-list.

mod builder;

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::{RegionConfig, SyncStrategy};
use crate::error::{RegionError, Result};
use crate::header::{HeaderEntryProvider, HeaderLayout, SectorMap, SectorRange, MAX_SECTOR_COUNT};
use crate::key::{Key, KeyProvider, RegionId};
use crate::tracker::SectorTracker;

pub use builder::RegionBuilder;

/// Size of the length prefix stored before every payload
pub const LENGTH_PREFIX_BYTES: usize = 4;

/// Index of the sector map among the header tables
pub const SECTOR_MAP_INDEX: usize = 0;

/// Mutable state shared by every operation on one file
struct RegionState {
    file: File,
    sector_map: SectorMap,
    tracker: SectorTracker,
}

/// A region file
///
/// ## Concurrency
/// The file handle, sector map and free-list sit behind one mutex, so reads,
/// writes and deletes on the same region are serialized. The region can be
/// shared across threads (`Arc<Region<K>>`). Opening the same file twice,
/// from this or another process, fails with `AlreadyOpen`.
///
/// ## Foreign Keys
/// Keys whose `region_id` names another region are rejected with
/// `InvalidAddress` by every operation returning `Result`. The boolean and
/// `Option` queries (`has_value`, `entry_location`) report them as absent.
pub struct Region<K: Key> {
    region_id: RegionId,
    path: PathBuf,
    key_provider: Box<dyn KeyProvider<K>>,
    /// Extra header tables, laid out after the sector map
    header_providers: Vec<Box<dyn HeaderEntryProvider<K>>>,
    layout: HeaderLayout,
    slot_count: u32,
    config: RegionConfig,
    state: Mutex<RegionState>,
}

impl<K: Key> Region<K> {
    pub fn builder() -> RegionBuilder<K> {
        RegionBuilder::new()
    }

    /// Store `value` under `key`, replacing any previous value
    ///
    /// Steps:
    /// 1. Reserve `ceil((len + 4) / sector_size)` sectors for the key's slot
    /// 2. Write length prefix, payload and padding at the run's offset
    /// 3. Write the extra header tables' records for the slot
    /// 4. Write the sector map record, then free the slot's previous run
    ///
    /// A failure in steps 2-3 restores the previous mapping. A failure in
    /// step 4 keeps both runs allocated.
    pub fn write_value(&self, key: &K, value: &[u8]) -> Result<()> {
        let slot = self.slot_of(key)?;
        let sectors = self.sectors_for(value.len())?;

        // Extra records don't depend on the sector map; check them before any I/O
        let mut extra_records = Vec::with_capacity(self.header_providers.len());
        for (i, provider) in self.header_providers.iter().enumerate() {
            extra_records.push(self.checked_record(SECTOR_MAP_INDEX + 1 + i, provider.apply(key))?);
        }

        let sector_size = self.config.sector_size;
        let mut buf = BytesMut::with_capacity(sectors as usize * sector_size);
        buf.put_u32(value.len() as u32);
        buf.put_slice(value);
        buf.resize(sectors as usize * sector_size, 0);

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let reservation = state.tracker.reserve(&mut state.sector_map, slot, sectors)?;
        let range = reservation.range();

        if let Err(e) = self.write_entry(&mut state.file, range, &buf, slot, &extra_records) {
            warn!(region = %self.region_id, slot, error = %e, "entry write failed, reservation undone");
            state.tracker.abort(&mut state.sector_map, reservation)?;
            return Err(e);
        }

        let map_record = HeaderEntryProvider::<K>::apply(&state.sector_map, key);
        if let Err(e) = self.write_header_record(&mut state.file, SECTOR_MAP_INDEX, slot, &map_record) {
            // The record may or may not have landed; both runs stay allocated
            warn!(
                region = %self.region_id,
                slot,
                error = %e,
                previous = ?reservation.previous(),
                "sector map write failed, previous run leaked"
            );
            return Err(e);
        }
        if self.config.sync_strategy == SyncStrategy::EveryWrite {
            state.file.sync_data()?;
        }
        state.tracker.commit(reservation);

        trace!(
            region = %self.region_id,
            slot,
            len = value.len(),
            offset = range.offset,
            sectors,
            "wrote value"
        );
        Ok(())
    }

    /// Read the value stored under `key`
    ///
    /// Returns:
    /// - `Ok(Some(value))`: key present
    /// - `Ok(None)`: nothing stored for the key
    /// - `Err(CorruptedData)`: stored length doesn't fit the key's sectors,
    ///   or the file ends inside the entry
    pub fn read_value(&self, key: &K) -> Result<Option<Vec<u8>>> {
        let slot = self.slot_of(key)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(range) = state.sector_map.get(slot) else {
            return Ok(None);
        };

        let sector_size = self.config.sector_size;
        let offset = range.byte_offset(sector_size);

        let mut prefix = [0u8; LENGTH_PREFIX_BYTES];
        self.read_entry_bytes(&mut state.file, offset, &mut prefix, slot, range)?;
        let len = u32::from_be_bytes(prefix) as u64;

        let capacity = range.byte_len(sector_size);
        if len + LENGTH_PREFIX_BYTES as u64 > capacity {
            warn!(
                region = %self.region_id,
                slot,
                declared = len,
                capacity,
                "entry length exceeds its sectors"
            );
            return Err(RegionError::CorruptedData(format!(
                "slot {} declares {} bytes but its {} sectors hold at most {}",
                slot,
                len,
                range.count,
                capacity - LENGTH_PREFIX_BYTES as u64
            )));
        }

        let mut value = vec![0u8; len as usize];
        self.read_entry_bytes(
            &mut state.file,
            offset + LENGTH_PREFIX_BYTES as u64,
            &mut value,
            slot,
            range,
        )?;

        Ok(Some(value))
    }

    /// True if anything is stored under `key` (no data is read)
    ///
    /// Keys from other regions are never present.
    pub fn has_value(&self, key: &K) -> bool {
        match self.slot_of(key) {
            Ok(slot) => self.state.lock().sector_map.get(slot).is_some(),
            Err(_) => false,
        }
    }

    /// Remove the value under `key`, freeing its sectors
    ///
    /// Returns whether anything was stored. Other header tables keep their
    /// last record for the slot.
    pub fn delete_value(&self, key: &K) -> Result<bool> {
        let slot = self.slot_of(key)?;

        let mut guard = self.state.lock();
        let state = &mut *guard;

        let Some(range) = state.sector_map.get(slot) else {
            return Ok(false);
        };

        // The run stays allocated until the file no longer points at it
        let absent = [0u8; SectorMap::ENTRY_BYTES];
        self.write_header_record(&mut state.file, SECTOR_MAP_INDEX, slot, &absent)?;
        if self.config.sync_strategy == SyncStrategy::EveryWrite {
            state.file.sync_data()?;
        }

        state.tracker.release(&mut state.sector_map, slot)?;

        trace!(region = %self.region_id, slot, offset = range.offset, "deleted value");
        Ok(true)
    }

    /// Visit every stored key in ascending slot order
    ///
    /// Visits a snapshot taken when the call starts, so `visitor` may read
    /// or write this region. The first error from `visitor` (or from
    /// rebuilding a key) stops the iteration and is returned.
    pub fn for_each_key<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(K) -> Result<()>,
    {
        let slots: Vec<u32> = {
            let state = self.state.lock();
            state.sector_map.iter().map(|(slot, _)| slot).collect()
        };

        for slot in slots {
            let key = self.key_provider.from_region_and_slot(&self.region_id, slot)?;
            visitor(key)?;
        }
        Ok(())
    }

    /// Every stored key, in ascending slot order
    pub fn keys(&self) -> Result<Vec<K>> {
        let mut keys = Vec::new();
        self.for_each_key(|key| {
            keys.push(key);
            Ok(())
        })?;
        Ok(keys)
    }

    /// Sector run currently holding `key`'s entry
    pub fn entry_location(&self, key: &K) -> Option<SectorRange> {
        let slot = self.slot_of(key).ok()?;
        self.state.lock().sector_map.get(slot)
    }

    /// Raw record of header table `index` for `key` (0 is the sector map)
    pub fn read_header_entry(&self, key: &K, index: usize) -> Result<Vec<u8>> {
        let slot = self.slot_of(key)?;
        let (offset, width) = self
            .layout
            .record_offset(index, slot)
            .zip(self.layout.width(index))
            .ok_or_else(|| {
                RegionError::InvalidAddress(format!(
                    "no header table {} (region has {})",
                    index,
                    self.layout.provider_count()
                ))
            })?;

        let mut record = vec![0u8; width];
        let mut state = self.state.lock();
        state.file.seek(SeekFrom::Start(offset))?;
        state.file.read_exact(&mut record)?;
        Ok(record)
    }

    /// Flush file data and metadata to disk
    pub fn sync(&self) -> Result<()> {
        self.state.lock().file.sync_all()?;
        Ok(())
    }

    /// Flush and release the file (and its lock)
    pub fn close(self) -> Result<()> {
        let state = self.state.into_inner();
        state.file.sync_all()?;

        debug!(
            region = %self.region_id,
            entries = state.sector_map.present_count(),
            end_sector = state.tracker.end_sector(),
            "closed region"
        );
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn region_id(&self) -> &RegionId {
        &self.region_id
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of slots (keys) this region can hold
    pub fn key_count(&self) -> u32 {
        self.slot_count
    }

    pub fn sector_size(&self) -> usize {
        self.config.sector_size
    }

    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    /// Sectors reserved for the header tables
    pub fn header_sectors(&self) -> u32 {
        self.state.lock().tracker.header_sectors()
    }

    /// First sector past every entry
    pub fn end_sector(&self) -> u32 {
        self.state.lock().tracker.end_sector()
    }

    /// Current file length in sectors, rounded up
    ///
    /// May exceed `end_sector()` after the trailing entry is freed; the file
    /// is never truncated.
    pub fn file_sectors(&self) -> Result<u64> {
        let len = self.state.lock().file.metadata()?.len();
        Ok(len.div_ceil(self.config.sector_size as u64))
    }

    /// Free sectors between the header and the last entry
    pub fn free_sector_count(&self) -> u64 {
        self.state.lock().tracker.free_sector_count()
    }

    /// Number of stored entries
    pub fn entry_count(&self) -> usize {
        self.state.lock().sector_map.present_count()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Slot of `key`, checking it belongs to this region
    fn slot_of(&self, key: &K) -> Result<u32> {
        let key_region = key.region_id();
        if key_region != self.region_id {
            return Err(RegionError::InvalidAddress(format!(
                "key {:?} belongs to region {}, not {}",
                key, key_region, self.region_id
            )));
        }

        let slot = key.slot_id();
        if slot >= self.slot_count {
            return Err(RegionError::InvalidAddress(format!(
                "key {:?} maps to slot {} (slot count {})",
                key, slot, self.slot_count
            )));
        }
        Ok(slot)
    }

    /// Sectors needed for a payload of `len` bytes plus its prefix
    fn sectors_for(&self, len: usize) -> Result<u32> {
        let total = len as u64 + LENGTH_PREFIX_BYTES as u64;
        let sectors = total.div_ceil(self.config.sector_size as u64);
        if len as u64 > u32::MAX as u64 || sectors > MAX_SECTOR_COUNT as u64 {
            return Err(RegionError::CapacityExceeded(format!(
                "{} byte value needs {} sectors, max {}",
                len, sectors, MAX_SECTOR_COUNT
            )));
        }
        Ok(sectors as u32)
    }

    fn checked_record(&self, index: usize, record: Bytes) -> Result<Bytes> {
        let expected = self.layout.width(index).unwrap_or(0);
        if record.len() != expected {
            return Err(RegionError::InvalidHeaderEntry {
                expected,
                actual: record.len(),
            });
        }
        Ok(record)
    }

    /// Payload run plus extra header records; everything but the sector map
    fn write_entry(
        &self,
        file: &mut File,
        range: SectorRange,
        buf: &[u8],
        slot: u32,
        extra_records: &[Bytes],
    ) -> Result<()> {
        file.seek(SeekFrom::Start(range.byte_offset(self.config.sector_size)))?;
        file.write_all(buf)?;

        for (i, record) in extra_records.iter().enumerate() {
            self.write_header_record(file, SECTOR_MAP_INDEX + 1 + i, slot, record)?;
        }

        if self.config.sync_strategy == SyncStrategy::EveryWrite {
            file.sync_data()?;
        }
        Ok(())
    }

    fn write_header_record(&self, file: &mut File, index: usize, slot: u32, record: &[u8]) -> Result<()> {
        let offset = self.layout.record_offset(index, slot).ok_or_else(|| {
            RegionError::InvalidAddress(format!("no header record {} for slot {}", index, slot))
        })?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(record)?;
        Ok(())
    }

    /// Read part of an entry; a file ending inside it is corruption
    fn read_entry_bytes(
        &self,
        file: &mut File,
        offset: u64,
        buf: &mut [u8],
        slot: u32,
        range: SectorRange,
    ) -> Result<()> {
        file.seek(SeekFrom::Start(offset))?;
        match file.read_exact(buf) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(region = %self.region_id, slot, ?range, "entry truncated by end of file");
                Err(RegionError::CorruptedData(format!(
                    "slot {} sectors {}..{} run past the end of the file",
                    slot,
                    range.offset,
                    range.end()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl<K: Key> fmt::Debug for Region<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Region")
            .field("region_id", &self.region_id)
            .field("path", &self.path)
            .field("slot_count", &self.slot_count)
            .field("layout", &self.layout)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
