//! 3D entry locations
//!
//! Keys made of three signed coordinates. Each axis contributes 4 fine bits to
//! the slot id, giving 16 x 16 x 16 = 4096 slots per region. Region files are
//! named `"<x>.<y>.<z>.3dr"` after the coarse coordinates.

use std::fmt;

use crate::error::{RegionError, Result};

use super::{Key, KeyProvider, RegionId};

/// Fine bits per axis
const LOC_BITS: u32 = 4;

const LOC_BITMASK: i32 = (1 << LOC_BITS) - 1;

/// Slots per 3D region
pub const ENTRIES_PER_REGION: u32 = 1 << (LOC_BITS * 3);

/// File name suffix identifying the 3D key space
pub const REGION_SUFFIX: &str = ".3dr";

/// Coarse coordinates whose shifted value still fits an `i32`
const MIN_REGION_COORD: i64 = (i32::MIN >> LOC_BITS) as i64;
const MAX_REGION_COORD: i64 = (i32::MAX >> LOC_BITS) as i64;

/// A 3D key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryLocation3D {
    x: i32,
    y: i32,
    z: i32,
}

impl EntryLocation3D {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn z(&self) -> i32 {
        self.z
    }
}

impl Key for EntryLocation3D {
    fn region_id(&self) -> RegionId {
        RegionId::new(format!(
            "{}.{}.{}{}",
            self.x >> LOC_BITS,
            self.y >> LOC_BITS,
            self.z >> LOC_BITS,
            REGION_SUFFIX
        ))
    }

    /// `x` occupies the highest bits, `z` the lowest
    fn slot_id(&self) -> u32 {
        (((self.x & LOC_BITMASK) << (LOC_BITS * 2))
            | ((self.y & LOC_BITMASK) << LOC_BITS)
            | (self.z & LOC_BITMASK)) as u32
    }
}

impl fmt::Display for EntryLocation3D {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Inverse mapping for [`EntryLocation3D`]
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryLocation3DProvider;

impl KeyProvider<EntryLocation3D> for EntryLocation3DProvider {
    fn from_region_and_slot(&self, region: &RegionId, slot: u32) -> Result<EntryLocation3D> {
        if slot >= ENTRIES_PER_REGION {
            return Err(RegionError::InvalidAddress(format!(
                "slot {} out of range for {} (max {})",
                slot,
                region,
                ENTRIES_PER_REGION - 1
            )));
        }

        let [region_x, region_y, region_z] = parse_region_name(region.name())?;

        let slot = slot as i32;
        let rel_x = (slot >> (LOC_BITS * 2)) & LOC_BITMASK;
        let rel_y = (slot >> LOC_BITS) & LOC_BITMASK;
        let rel_z = slot & LOC_BITMASK;

        Ok(EntryLocation3D::new(
            (region_x << LOC_BITS) | rel_x,
            (region_y << LOC_BITS) | rel_y,
            (region_z << LOC_BITS) | rel_z,
        ))
    }

    fn slot_count(&self, _region: &RegionId) -> u32 {
        ENTRIES_PER_REGION
    }
}

/// Parse `"<x>.<y>.<z>.3dr"` into coarse coordinates
fn parse_region_name(name: &str) -> Result<[i32; 3]> {
    let invalid = || RegionError::InvalidAddress(format!("Invalid region name {:?}", name));

    let stem = name.strip_suffix(REGION_SUFFIX).ok_or_else(invalid)?;
    let mut parts = stem.split('.');

    let mut coords = [0i32; 3];
    for coord in coords.iter_mut() {
        let part = parts.next().ok_or_else(invalid)?;
        let digits = part.strip_prefix('-').unwrap_or(part);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        // Well-formed but too large for the coordinate type
        let value: i64 = part.parse().unwrap_or(i64::MAX);
        if !(MIN_REGION_COORD..=MAX_REGION_COORD).contains(&value) {
            return Err(RegionError::CapacityExceeded(format!(
                "region coordinate {} in {:?} is outside [{}, {}]",
                part, name, MIN_REGION_COORD, MAX_REGION_COORD
            )));
        }
        *coord = value as i32;
    }

    if parts.next().is_some() {
        return Err(invalid());
    }

    Ok(coords)
}
