// crates/reply-triage-cli/src/input.rs
// ============================================================================
// Module: Bounded Input Reads
// Description: Size-limited file reads and JSON decoding for CLI inputs.
// Purpose: Keep untrusted input files from exhausting memory.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every file the CLI reads (fixtures, scripts, step inputs) goes through
//! [`read_bytes_with_limit`], which checks the file size before reading and
//! caps the read in case the file grows in between.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a thread fixture file.
pub const MAX_FIXTURE_BYTES: usize = 4 * 1024 * 1024;
/// Maximum size of a replay script or step input file.
pub const MAX_INPUT_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Bounded read failures.
#[derive(Debug, Error)]
pub enum ReadLimitError {
    /// The file could not be read.
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    /// The file exceeds the limit.
    #[error("file too large: {size} bytes (max {limit})")]
    TooLarge {
        /// Observed size in bytes.
        size: u64,
        /// Limit in bytes.
        limit: usize,
    },
    /// The content is not valid JSON for the expected shape.
    #[error("invalid json: {0}")]
    Json(String),
}

// ============================================================================
// SECTION: Reads
// ============================================================================

/// Reads a file, failing when it exceeds `max_bytes`.
///
/// # Errors
///
/// Returns [`ReadLimitError`] when the file cannot be read or is too large.
pub fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Reads and decodes a JSON file with a size limit.
///
/// # Errors
///
/// Returns [`ReadLimitError`] when reading or decoding fails.
pub fn read_json_with_limit<T: DeserializeOwned>(path: &Path, max_bytes: usize) -> Result<T, ReadLimitError> {
    let bytes = read_bytes_with_limit(path, max_bytes)?;
    serde_json::from_slice(&bytes).map_err(|err| ReadLimitError::Json(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
