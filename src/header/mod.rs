//! Header Module
//!
//! Fixed-width per-slot metadata stored at the front of every region file.
//!
//! ## Layout
//! Each provider owns one contiguous table of `slot_count` records. Tables are
//! concatenated in provider order, the sector map always first:
//! ```text
//! ┌──────────────────────────────────────────────┐ offset 0
//! │ Sector map: slot_count x 4 bytes             │
//! ├──────────────────────────────────────────────┤ base_1 = slot_count * 4
//! │ Provider 1: slot_count x width_1 bytes       │
//! ├──────────────────────────────────────────────┤ base_2 = base_1 + slot_count * width_1
//! │ ...                                          │
//! ├──────────────────────────────────────────────┤
//! │ zero padding up to the next sector boundary  │
//! └──────────────────────────────────────────────┘
//! ```
//! Slot `s` of provider `i` lives at `base_i + s * width_i`. The layout is
//! fixed when the file is created; changing providers needs a rewrite.

mod sector_map;
mod timestamp;

use bytes::Bytes;

use crate::key::Key;

pub use sector_map::{SectorMap, SectorRange, MAX_SECTOR_COUNT, MAX_SECTOR_OFFSET};
pub use timestamp::{TimeUnit, TimestampHeaderProvider};

/// Writes one fixed-width record per slot into the header region
pub trait HeaderEntryProvider<K: Key>: Send + Sync {
    /// Width of every record produced by this provider
    fn entry_byte_count(&self) -> usize;

    /// Record to persist for `key`'s slot; must be exactly
    /// `entry_byte_count()` bytes long.
    fn apply(&self, key: &K) -> Bytes;
}

/// Provider built from a width and a plain function
///
/// ```
/// use bytes::Bytes;
/// use regionkv::header::{FnHeaderProvider, HeaderEntryProvider};
/// use regionkv::key::EntryLocation3D;
///
/// let tag = FnHeaderProvider::new(1, |_key: &EntryLocation3D| Bytes::from_static(&[7]));
/// assert_eq!(tag.entry_byte_count(), 1);
/// ```
pub struct FnHeaderProvider<F> {
    width: usize,
    f: F,
}

impl<F> FnHeaderProvider<F> {
    pub fn new(width: usize, f: F) -> Self {
        Self { width, f }
    }
}

impl<K, F> HeaderEntryProvider<K> for FnHeaderProvider<F>
where
    K: Key,
    F: Fn(&K) -> Bytes + Send + Sync,
{
    fn entry_byte_count(&self) -> usize {
        self.width
    }

    fn apply(&self, key: &K) -> Bytes {
        (self.f)(key)
    }
}

/// Byte offsets of every provider table, resolved once per region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLayout {
    slot_count: u32,
    /// (base offset, record width) per provider
    tables: Vec<(u64, usize)>,
    total_bytes: u64,
}

impl HeaderLayout {
    /// Prefix-sum the table bases for providers of the given widths
    pub fn new(slot_count: u32, widths: impl IntoIterator<Item = usize>) -> Self {
        let mut tables = Vec::new();
        let mut base = 0u64;
        for width in widths {
            tables.push((base, width));
            base += slot_count as u64 * width as u64;
        }
        Self {
            slot_count,
            tables,
            total_bytes: base,
        }
    }

    /// File offset of `slot`'s record in provider `index`'s table
    pub fn record_offset(&self, index: usize, slot: u32) -> Option<u64> {
        let (base, width) = *self.tables.get(index)?;
        (slot < self.slot_count).then(|| base + slot as u64 * width as u64)
    }

    /// Record width of provider `index`
    pub fn width(&self, index: usize) -> Option<usize> {
        self.tables.get(index).map(|&(_, width)| width)
    }

    pub fn provider_count(&self) -> usize {
        self.tables.len()
    }

    /// Header bytes before sector padding
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Sectors reserved for the header (rounded up, never allocatable to entries)
    pub fn sectors(&self, sector_size: usize) -> u64 {
        self.total_bytes.div_ceil(sector_size as u64)
    }
}
