//! Error types for regionkv
//!
//! Provides a unified error type for all region file operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using RegionError
pub type Result<T> = std::result::Result<T, RegionError>;

/// Unified error type for region operations
#[derive(Debug, Error)]
pub enum RegionError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    /// Underlying storage read/write/extend failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Another region instance already holds the file
    #[error("Region file already open: {}", .0.display())]
    AlreadyOpen(PathBuf),

    // -------------------------------------------------------------------------
    // Addressing Errors
    // -------------------------------------------------------------------------
    /// Malformed region name, out-of-range slot id, or a key from another region
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Value cannot be represented in the packed header word or key range
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    // -------------------------------------------------------------------------
    // Data Errors
    // -------------------------------------------------------------------------
    /// Stored data is inconsistent with the sector map
    #[error("Corrupted data: {0}")]
    CorruptedData(String),

    /// A header provider produced a record of the wrong width
    #[error("Header entry has {actual} bytes, expected {expected}")]
    InvalidHeaderEntry { expected: usize, actual: usize },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}
