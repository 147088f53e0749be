//! Sector Map
//!
//! Persisted slot -> (offset, count) table, one packed big-endian u32 per slot.
//!
//! ## Packed Word
//! ```text
//!  31                              8 7           0
//! ┌─────────────────────────────────┬─────────────┐
//! │ offset in sectors (24 bits)     │ count (8)   │
//! └─────────────────────────────────┴─────────────┘
//! ```
//! With 512-byte sectors this caps a file at 8 GiB and an entry at 255
//! sectors (~127 KiB). The all-zero word means "absent": offset 0 is always
//! inside the header and no entry is ever granted zero sectors, so a fresh
//! zero-filled header reads as empty.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use bytes::Bytes;

use crate::error::{RegionError, Result};
use crate::key::Key;

use super::HeaderEntryProvider;

const COUNT_BITS: u32 = 8;
const COUNT_MASK: u32 = (1 << COUNT_BITS) - 1;

/// Absent sentinel
const ABSENT: u32 = 0;

/// Largest representable run length in sectors
pub const MAX_SECTOR_COUNT: u32 = COUNT_MASK;

/// Largest representable starting sector
pub const MAX_SECTOR_OFFSET: u32 = u32::MAX >> COUNT_BITS;

/// A contiguous run of sectors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SectorRange {
    /// First sector of the run
    pub offset: u32,
    /// Number of sectors in the run
    pub count: u32,
}

impl SectorRange {
    pub fn new(offset: u32, count: u32) -> Self {
        Self { offset, count }
    }

    /// One past the last sector
    pub fn end(&self) -> u64 {
        self.offset as u64 + self.count as u64
    }

    pub fn overlaps(&self, other: &SectorRange) -> bool {
        (self.offset as u64) < other.end() && (other.offset as u64) < self.end()
    }

    /// Byte position of the run's first sector
    pub fn byte_offset(&self, sector_size: usize) -> u64 {
        self.offset as u64 * sector_size as u64
    }

    /// Bytes available in the run
    pub fn byte_len(&self, sector_size: usize) -> u64 {
        self.count as u64 * sector_size as u64
    }
}

/// In-memory copy of the on-disk sector map
#[derive(Debug, Clone)]
pub struct SectorMap {
    entries: Vec<u32>,
}

impl SectorMap {
    /// Bytes per slot in the header
    pub const ENTRY_BYTES: usize = 4;

    /// An all-absent map (what a new file reads as)
    pub fn new(slot_count: u32) -> Self {
        Self {
            entries: vec![ABSENT; slot_count as usize],
        }
    }

    /// Load `slot_count` words from the start of `file`
    ///
    /// A new or short file is treated as zero-filled, so every missing slot
    /// reads as absent.
    pub fn read_or_create(file: &mut File, slot_count: u32) -> Result<Self> {
        let table_bytes = slot_count as u64 * Self::ENTRY_BYTES as u64;

        file.seek(SeekFrom::Start(0))?;
        let mut raw = Vec::with_capacity(table_bytes as usize);
        file.by_ref().take(table_bytes).read_to_end(&mut raw)?;
        raw.resize(table_bytes as usize, 0);

        let entries = raw
            .chunks_exact(Self::ENTRY_BYTES)
            .map(|word| u32::from_be_bytes([word[0], word[1], word[2], word[3]]))
            .collect();

        Ok(Self { entries })
    }

    pub fn slot_count(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Location of `slot`'s entry, or `None` if absent or out of range
    pub fn get(&self, slot: u32) -> Option<SectorRange> {
        self.entries.get(slot as usize).copied().and_then(unpack)
    }

    /// Point `slot` at `range`
    pub fn set(&mut self, slot: u32, range: SectorRange) -> Result<()> {
        let word = pack(range)?;
        let entry = self.entry_mut(slot)?;
        *entry = word;
        Ok(())
    }

    /// Mark `slot` absent
    pub fn clear(&mut self, slot: u32) -> Result<()> {
        *self.entry_mut(slot)? = ABSENT;
        Ok(())
    }

    /// Raw packed word for `slot` (0 when absent or out of range)
    pub fn packed(&self, slot: u32) -> u32 {
        self.entries.get(slot as usize).copied().unwrap_or(ABSENT)
    }

    /// Present entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (u32, SectorRange)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(slot, &word)| unpack(word).map(|range| (slot as u32, range)))
    }

    pub fn present_count(&self) -> usize {
        self.iter().count()
    }

    fn entry_mut(&mut self, slot: u32) -> Result<&mut u32> {
        let slot_count = self.entries.len();
        self.entries.get_mut(slot as usize).ok_or_else(|| {
            RegionError::InvalidAddress(format!(
                "slot {} out of range (slot count {})",
                slot, slot_count
            ))
        })
    }
}

impl<K: Key> HeaderEntryProvider<K> for SectorMap {
    fn entry_byte_count(&self) -> usize {
        Self::ENTRY_BYTES
    }

    fn apply(&self, key: &K) -> Bytes {
        Bytes::copy_from_slice(&self.packed(key.slot_id()).to_be_bytes())
    }
}

fn pack(range: SectorRange) -> Result<u32> {
    if range.offset > MAX_SECTOR_OFFSET {
        return Err(RegionError::CapacityExceeded(format!(
            "sector offset {} exceeds max {}",
            range.offset, MAX_SECTOR_OFFSET
        )));
    }
    if range.count > MAX_SECTOR_COUNT {
        return Err(RegionError::CapacityExceeded(format!(
            "sector count {} exceeds max {}",
            range.count, MAX_SECTOR_COUNT
        )));
    }
    if range.offset == 0 || range.count == 0 {
        return Err(RegionError::InvalidAddress(format!(
            "{:?} collides with the absent marker",
            range
        )));
    }
    Ok((range.offset << COUNT_BITS) | range.count)
}

fn unpack(word: u32) -> Option<SectorRange> {
    if word == ABSENT {
        return None;
    }
    Some(SectorRange::new(word >> COUNT_BITS, word & COUNT_MASK))
}
