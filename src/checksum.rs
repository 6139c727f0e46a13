//! Content-addressed change detection.
//!
//! A document's checksum is a SHA-256 digest of its raw, unparsed bytes,
//! hex-encoded. It is used purely as an equality oracle across sync runs:
//! identical bytes produce identical checksums, and any byte change produces
//! a different one.

use sha2::{Digest, Sha256};

/// Compute the hex-encoded SHA-256 checksum of a document's raw bytes.
pub fn checksum(raw: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw);
    format!("{:x}", hasher.finalize())
}
