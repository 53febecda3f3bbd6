//! Shared SHA-256 hex digest utility.
//!
//! Used for image content hashes, normalized-URL hashes and search cache
//! keys so every digest in the cache tables has the same shape.

use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}
