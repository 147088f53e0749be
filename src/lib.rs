//! # regionkv
//!
//! A sector-allocated region file store:
//! - Structured keys split into a region file and a slot within it
//! - Fixed-size sectors with first-fit reuse of freed space
//! - Packed per-slot sector map plus pluggable per-slot metadata tables
//! - Length-prefixed entries with corruption checks on read
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Region Provider (external)                   │
//! │            (pools open regions by file name)                 │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Region::builder()
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                        Region                                │
//! │        write / read / has / delete / for_each_key            │
//! └──────┬──────────────────────┬──────────────────────┬────────┘
//!        │                      │                      │
//!        ▼                      ▼                      ▼
//!  ┌───────────┐        ┌──────────────┐       ┌───────────────┐
//!  │    Key    │        │ SectorTracker│       │    Header     │
//!  │ region +  │        │  (free-list) │──────►│ SectorMap +   │
//!  │   slot    │        └──────────────┘       │ extra tables  │
//!  └───────────┘                               └───────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use regionkv::key::{EntryLocation3D, EntryLocation3DProvider, Key};
//! use regionkv::Region;
//!
//! # fn main() -> regionkv::Result<()> {
//! let key = EntryLocation3D::new(1, 2, 3);
//! let region = Region::<EntryLocation3D>::builder()
//!     .directory("./regions")
//!     .region_id(key.region_id())
//!     .key_provider(EntryLocation3DProvider)
//!     .build()?;
//!
//! region.write_value(&key, b"hello")?;
//! assert_eq!(region.read_value(&key)?, Some(b"hello".to_vec()));
//! region.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod key;
pub mod header;
pub mod tracker;
pub mod region;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RegionError, Result};
pub use config::{RegionConfig, SyncStrategy};
pub use key::{Key, KeyProvider, RegionId};
pub use region::{Region, RegionBuilder};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of regionkv
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
