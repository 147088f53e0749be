//! Tests for header tables
//!
//! These tests verify:
//! - Header sizing with extra providers
//! - Per-slot records written for every provider
//! - Provider width validation

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use regionkv::header::{FnHeaderProvider, TimeUnit, TimestampHeaderProvider};
use regionkv::key::{EntryLocation3D, EntryLocation3DProvider, Key};
use regionkv::region::SECTOR_MAP_INDEX;
use regionkv::{Region, RegionError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn slot_tag(key: &EntryLocation3D) -> Bytes {
    Bytes::copy_from_slice(&(key.slot_id() as u16 ^ 0xA5A5).to_be_bytes())
}

fn open_with_headers(dir: &std::path::Path) -> Region<EntryLocation3D> {
    Region::builder()
        .directory(dir)
        .region_id("0.0.0.3dr")
        .key_provider(EntryLocation3DProvider)
        .add_header_entry(TimestampHeaderProvider::new(TimeUnit::Seconds))
        .add_header_entry(FnHeaderProvider::new(2, slot_tag))
        .build()
        .unwrap()
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_header_grows_with_providers() {
    let temp = TempDir::new().unwrap();
    let region = open_with_headers(temp.path());

    // 4096 x (4 + 8 + 2) bytes = 57344 bytes = 112 sectors
    assert_eq!(region.header_sectors(), 112);

    let k = EntryLocation3D::new(0, 0, 0);
    region.write_value(&k, b"first").unwrap();
    assert_eq!(region.entry_location(&k).unwrap().offset, 112);
}

// =============================================================================
// Record Tests
// =============================================================================

#[test]
fn test_records_written_for_every_provider() {
    let temp = TempDir::new().unwrap();
    let region = open_with_headers(temp.path());
    let k = EntryLocation3D::new(1, 2, 3);
    let before = now_secs();

    region.write_value(&k, b"stamped").unwrap();

    let location = region.entry_location(&k).unwrap();
    let map_record = region.read_header_entry(&k, SECTOR_MAP_INDEX).unwrap();
    assert_eq!(
        map_record,
        ((location.offset << 8) | location.count).to_be_bytes().to_vec()
    );

    let stamp = region.read_header_entry(&k, 1).unwrap();
    let written_at = TimestampHeaderProvider::decode(&stamp).unwrap();
    assert!(written_at >= before && written_at <= now_secs());

    let tag = region.read_header_entry(&k, 2).unwrap();
    assert_eq!(tag, slot_tag(&k).to_vec());
}

#[test]
fn test_unwritten_slot_records_are_zero() {
    let temp = TempDir::new().unwrap();
    let region = open_with_headers(temp.path());
    let k = EntryLocation3D::new(4, 5, 6);

    assert_eq!(region.read_header_entry(&k, 0).unwrap(), vec![0; 4]);
    assert_eq!(
        TimestampHeaderProvider::decode(&region.read_header_entry(&k, 1).unwrap()),
        None
    );
    assert!(matches!(
        region.read_header_entry(&k, 3),
        Err(RegionError::InvalidAddress(_))
    ));
}

#[test]
fn test_records_survive_reopen() {
    let temp = TempDir::new().unwrap();
    let k = EntryLocation3D::new(9, 0, 9);

    {
        let region = open_with_headers(temp.path());
        region.write_value(&k, &[7u8; 900]).unwrap();
        region.close().unwrap();
    }

    let region = open_with_headers(temp.path());
    assert_eq!(region.read_value(&k).unwrap(), Some(vec![7u8; 900]));
    assert_eq!(region.read_header_entry(&k, 2).unwrap(), slot_tag(&k).to_vec());
}

#[test]
fn test_delete_clears_sector_map_record() {
    let temp = TempDir::new().unwrap();
    let region = open_with_headers(temp.path());
    let k = EntryLocation3D::new(2, 2, 2);

    region.write_value(&k, b"gone soon").unwrap();
    region.delete_value(&k).unwrap();

    assert_eq!(region.read_header_entry(&k, SECTOR_MAP_INDEX).unwrap(), vec![0; 4]);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_wrong_width_record_rejected_before_write() {
    let temp = TempDir::new().unwrap();
    let region = Region::<EntryLocation3D>::builder()
        .directory(temp.path())
        .region_id("0.0.0.3dr")
        .key_provider(EntryLocation3DProvider)
        .add_header_entry(FnHeaderProvider::new(4, |_: &EntryLocation3D| {
            Bytes::from_static(&[1, 2])
        }))
        .build()
        .unwrap();
    let k = EntryLocation3D::new(0, 1, 0);

    let result = region.write_value(&k, b"value");

    assert!(matches!(
        result,
        Err(RegionError::InvalidHeaderEntry {
            expected: 4,
            actual: 2
        })
    ));
    assert!(!region.has_value(&k));
    assert_eq!(region.end_sector(), region.header_sectors());
}
