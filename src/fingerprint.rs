//! Content fingerprinting for upload deduplication.
//!
//! The fingerprint is the sole cache key: identical bytes always map to the
//! same digest. SHA-256 is used for its collision resistance, not as a
//! security credential.

use sha2::{Digest, Sha256};

/// Compute the 64-character lowercase hex SHA-256 digest of a byte sequence.
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
