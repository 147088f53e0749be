//! Property tests
//!
//! These tests verify:
//! - Key addressing inverts for every coordinate
//! - Arbitrary write sequences read back their last value
//! - Live entries never share sectors and never touch the header

use std::collections::HashMap;

use proptest::prelude::*;
use regionkv::key::{EntryLocation3D, EntryLocation3DProvider, Key, KeyProvider};
use regionkv::Region;
use tempfile::TempDir;

// =============================================================================
// Strategies
// =============================================================================

fn local_key() -> impl Strategy<Value = EntryLocation3D> {
    (0..16i32, 0..16i32, 0..16i32).prop_map(|(x, y, z)| EntryLocation3D::new(x, y, z))
}

fn write_op() -> impl Strategy<Value = (EntryLocation3D, Vec<u8>)> {
    (local_key(), prop::collection::vec(any::<u8>(), 0..3000))
}

// =============================================================================
// Addressing Properties
// =============================================================================

proptest! {
    #[test]
    fn prop_address_inverts(x in any::<i32>(), y in any::<i32>(), z in any::<i32>()) {
        let key = EntryLocation3D::new(x, y, z);
        let provider = EntryLocation3DProvider;

        let slot = key.slot_id();
        prop_assert!(slot < provider.slot_count(&key.region_id()));

        let rebuilt = provider.from_region_and_slot(&key.region_id(), slot).unwrap();
        prop_assert_eq!(rebuilt, key);
    }
}

// =============================================================================
// Region Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_last_write_wins_without_overlap(
        ops in prop::collection::vec(write_op(), 1..40)
    ) {
        let temp = TempDir::new().unwrap();
        let region = Region::<EntryLocation3D>::builder()
            .directory(temp.path())
            .region_id("0.0.0.3dr")
            .key_provider(EntryLocation3DProvider)
            .build()
            .unwrap();

        let mut expected = HashMap::new();
        for (key, value) in ops {
            region.write_value(&key, &value).unwrap();
            expected.insert(key, value);
        }

        for (key, value) in &expected {
            let read = region.read_value(key).unwrap();
            prop_assert_eq!(read.as_ref(), Some(value));
        }
        prop_assert_eq!(region.entry_count(), expected.len());

        let mut ranges: Vec<_> = expected
            .keys()
            .map(|k| region.entry_location(k).unwrap())
            .collect();
        ranges.sort_by_key(|r| r.offset);

        prop_assert!(ranges[0].offset >= region.header_sectors());
        for pair in ranges.windows(2) {
            prop_assert!(!pair[0].overlaps(&pair[1]), "{:?} overlaps", pair);
        }
    }
}
