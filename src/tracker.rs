//! Sector Tracker
//!
//! Grants and reclaims sector runs inside one region file.
//!
//! ## State
//! Nothing here is persisted: the tracker is rebuilt from the sector map on
//! every open. It holds
//! - the reserved header prefix `[0, header_sectors)`
//! - free runs below the end of the allocated space, coalesced and keyed by
//!   their first sector
//! - `end`, the first sector past every allocation
//!
//! ```text
//! sector:  0 ........ H ................................ end
//!         ┌──────────┬──────┬─────┬──────────┬─────────┐
//!         │  header  │ used │free │   used   │  used   │ (file may extend further)
//!         └──────────┴──────┴─────┴──────────┴─────────┘
//! ```
//!
//! ## Allocation Policy
//! 1. Same size as the slot's current run: keep it.
//! 2. Otherwise take the lowest-offset free run that is large enough (first
//!    fit), splitting off the remainder.
//! 3. No fit: append at `end`.
//!
//! A free run never touches `end`; freeing the last run pulls `end` back.
//!
//! ## Two-Phase Replacement
//! A slot's previous run stays allocated until its [`Reservation`] is
//! committed, i.e. until the new header record is on disk. Until then the
//! on-disk sector map may still point at it, so it must not be handed out.
//! Aborting restores the previous mapping and frees the new run.

use std::collections::BTreeMap;

use tracing::trace;

use crate::error::{RegionError, Result};
use crate::header::{SectorMap, SectorRange, MAX_SECTOR_COUNT, MAX_SECTOR_OFFSET};

/// Free-list over one region file's sectors
#[derive(Debug, Clone)]
pub struct SectorTracker {
    header_sectors: u32,
    /// first sector -> run length
    free: BTreeMap<u32, u32>,
    end: u32,
}

/// A run granted to a slot, pending [`SectorTracker::commit`] or
/// [`SectorTracker::abort`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Reservation {
    slot: u32,
    range: SectorRange,
    /// Run the slot held before; `None` for a new slot
    previous: Option<SectorRange>,
    /// Same-size rewrite of the previous run
    in_place: bool,
}

impl Reservation {
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Run to write the entry into
    pub fn range(&self) -> SectorRange {
        self.range
    }

    pub fn previous(&self) -> Option<SectorRange> {
        self.previous
    }

    pub fn is_in_place(&self) -> bool {
        self.in_place
    }
}

impl SectorTracker {
    /// Rebuild from the present entries of `map`
    ///
    /// Fails with `CorruptedData` if an entry overlaps the header, another
    /// entry, or has zero length.
    pub fn from_sector_map(map: &SectorMap, header_sectors: u32) -> Result<Self> {
        let mut entries: Vec<(u32, SectorRange)> = map.iter().collect();
        entries.sort_by_key(|(_, range)| range.offset);

        let mut free = BTreeMap::new();
        let mut cursor = header_sectors as u64;

        for (slot, range) in entries {
            if range.count == 0 {
                return Err(RegionError::CorruptedData(format!(
                    "slot {} has a zero-length sector run at {}",
                    slot, range.offset
                )));
            }
            if range.offset < header_sectors {
                return Err(RegionError::CorruptedData(format!(
                    "slot {} at sector {} overlaps the {}-sector header",
                    slot, range.offset, header_sectors
                )));
            }

            let start = range.offset as u64;
            if start < cursor {
                return Err(RegionError::CorruptedData(format!(
                    "slot {} sectors {}..{} overlap another entry",
                    slot,
                    range.offset,
                    range.end()
                )));
            }
            if start > cursor {
                free.insert(cursor as u32, (start - cursor) as u32);
            }
            cursor = range.end();
        }

        Ok(Self {
            header_sectors,
            free,
            end: cursor as u32,
        })
    }

    /// Grant `sectors` contiguous sectors to `slot` and point `map` at them
    ///
    /// A slot whose current run already has the requested size keeps it.
    /// Otherwise the current run stays allocated until the returned
    /// reservation is committed. On error neither the tracker nor the map is
    /// changed.
    pub fn reserve(&mut self, map: &mut SectorMap, slot: u32, sectors: u32) -> Result<Reservation> {
        if sectors == 0 || sectors > MAX_SECTOR_COUNT {
            return Err(RegionError::CapacityExceeded(format!(
                "cannot reserve {} sectors (allowed 1..={})",
                sectors, MAX_SECTOR_COUNT
            )));
        }
        if slot >= map.slot_count() {
            return Err(RegionError::InvalidAddress(format!(
                "slot {} out of range (slot count {})",
                slot,
                map.slot_count()
            )));
        }

        let previous = map.get(slot);
        if let Some(range) = previous {
            if range.count == sectors {
                trace!(slot, offset = range.offset, sectors, "reusing sector run");
                return Ok(Reservation {
                    slot,
                    range,
                    previous,
                    in_place: true,
                });
            }
        }

        let offset = match self.take_first_fit(sectors) {
            Some(offset) => offset,
            None => self.append(sectors)?,
        };

        let range = SectorRange::new(offset, sectors);
        if let Err(e) = map.set(slot, range) {
            self.free_run(range);
            return Err(e);
        }

        trace!(
            slot,
            offset,
            sectors,
            previous = ?previous,
            end = self.end,
            "reserved sector run"
        );
        Ok(Reservation {
            slot,
            range,
            previous,
            in_place: false,
        })
    }

    /// The new run is durable: free the run it replaced
    pub fn commit(&mut self, reservation: Reservation) {
        if reservation.in_place {
            return;
        }
        if let Some(previous) = reservation.previous {
            self.free_run(previous);
            trace!(
                slot = reservation.slot,
                offset = previous.offset,
                sectors = previous.count,
                "freed replaced sector run"
            );
        }
    }

    /// The new run was never referenced on disk: undo the reservation
    pub fn abort(&mut self, map: &mut SectorMap, reservation: Reservation) -> Result<()> {
        if reservation.in_place {
            return Ok(());
        }
        match reservation.previous {
            Some(previous) => map.set(reservation.slot, previous)?,
            None => map.clear(reservation.slot)?,
        }
        self.free_run(reservation.range);
        trace!(
            slot = reservation.slot,
            offset = reservation.range.offset,
            sectors = reservation.range.count,
            "aborted sector reservation"
        );
        Ok(())
    }

    /// Free `slot`'s run and mark it absent in `map`
    pub fn release(&mut self, map: &mut SectorMap, slot: u32) -> Result<Option<SectorRange>> {
        let Some(range) = map.get(slot) else {
            return Ok(None);
        };
        map.clear(slot)?;
        self.free_run(range);
        trace!(slot, offset = range.offset, sectors = range.count, "released sector run");
        Ok(Some(range))
    }

    /// Sectors reserved for the header
    pub fn header_sectors(&self) -> u32 {
        self.header_sectors
    }

    /// First sector past every allocation
    pub fn end_sector(&self) -> u32 {
        self.end
    }

    /// Free runs below `end`, lowest offset first
    pub fn free_runs(&self) -> impl Iterator<Item = SectorRange> + '_ {
        self.free
            .iter()
            .map(|(&offset, &count)| SectorRange::new(offset, count))
    }

    pub fn free_sector_count(&self) -> u64 {
        self.free.values().map(|&count| count as u64).sum()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Lowest-offset free run of at least `sectors`, split to size
    fn take_first_fit(&mut self, sectors: u32) -> Option<u32> {
        let (&offset, &count) = self.free.iter().find(|(_, count)| **count >= sectors)?;
        self.free.remove(&offset);
        if count > sectors {
            self.free.insert(offset + sectors, count - sectors);
        }
        Some(offset)
    }

    /// Grow the allocated space by `sectors`
    fn append(&mut self, sectors: u32) -> Result<u32> {
        if self.end > MAX_SECTOR_OFFSET {
            return Err(RegionError::CapacityExceeded(format!(
                "region is full: next sector {} exceeds max offset {}",
                self.end, MAX_SECTOR_OFFSET
            )));
        }
        let offset = self.end;
        self.end += sectors;
        Ok(offset)
    }

    /// Return a run to the free-list, merging with its neighbours
    fn free_run(&mut self, range: SectorRange) {
        let mut start = range.offset;
        let mut count = range.count;

        let prev = self.free.range(..start).next_back().map(|(&k, &v)| (k, v));
        if let Some((prev, prev_count)) = prev {
            if prev + prev_count == start {
                self.free.remove(&prev);
                start = prev;
                count += prev_count;
            }
        }
        if let Some(next_count) = self.free.remove(&(start + count)) {
            count += next_count;
        }

        if start + count == self.end {
            self.end = start;
        } else {
            self.free.insert(start, count);
        }
    }
}
