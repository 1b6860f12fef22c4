// crates/change-gate-core/src/core/hashing.rs
// ============================================================================
// Module: Change Gate Checksums
// Description: Content hashing for changeset SQL text.
// Purpose: Detect drift between applied changesets and their source files.
// Dependencies: sha2
// ============================================================================

//! ## Overview
//! Every changeset is fingerprinted by hashing the raw bytes of its SQL text.
//! The digest is recorded when the changeset is applied and recomputed on
//! every later run; any difference is treated as drift. Hashing is over the
//! exact file contents, so whitespace and comment edits count as changes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;

// ============================================================================
// SECTION: Checksums
// ============================================================================

/// Length in characters of a hex-encoded SHA-256 checksum.
pub const CHECKSUM_HEX_LEN: usize = 64;

/// Returns the changeset checksum for SQL text.
///
/// The result is the fixed-length lowercase hex SHA-256 digest of the UTF-8
/// bytes of `sql_text`.
#[must_use]
pub fn checksum(sql_text: &str) -> String {
    let digest = Sha256::digest(sql_text.as_bytes());
    hex_encode(&digest)
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[usize::from(byte >> 4)] as char);
        out.push(HEX[usize::from(byte & 0x0f)] as char);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
