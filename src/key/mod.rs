//! Key Module
//!
//! Maps application keys to region files and slots within them.
//!
//! ## Addressing
//! A key's coordinate bits are split in two halves:
//! - **coarse** (high-order) bits select the region file ([`RegionId`])
//! - **fine** (low-order) bits select a slot inside that file
//!
//! Nearby keys therefore land in the same file, which bounds the number of
//! open files and lets a whole region be iterated in one pass.
//!
//! ```text
//!   key ──► region_id() ──► "0.0.0.3dr"  (file name)
//!    │
//!    └───► slot_id()   ──► 0..slot_count  (header table index)
//!
//!   (region_id, slot_id) ──► KeyProvider::from_region_and_slot ──► key
//! ```

mod location3d;

use std::fmt;
use std::hash::Hash;

use crate::error::Result;

pub use location3d::{EntryLocation3D, EntryLocation3DProvider};

/// Name of a region file, derived from the coarse bits of a key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(String);

impl RegionId {
    /// Wrap a region file name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The file name this region is stored under
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A structured key addressing one entry
///
/// Implementations must be deterministic: the same key always yields the same
/// region and slot, and the pair must be invertible through the matching
/// [`KeyProvider`].
pub trait Key: Clone + Eq + Hash + fmt::Debug + Send + Sync {
    /// Region file this key lives in
    fn region_id(&self) -> RegionId;

    /// Slot inside the region, in `0..slot_count`
    fn slot_id(&self) -> u32;
}

/// Per-geometry inverse mapping and slot count
///
/// This is the extension point for new key shapes: a new geometry is a new
/// `Key` type plus a provider for it.
pub trait KeyProvider<K: Key>: Send + Sync {
    /// Rebuild the key stored in `slot` of `region`
    ///
    /// Fails with `InvalidAddress` if the region name cannot be parsed or the
    /// slot is out of range.
    fn from_region_and_slot(&self, region: &RegionId, slot: u32) -> Result<K>;

    /// Number of slots in every region of this key type
    fn slot_count(&self, region: &RegionId) -> u32;
}
