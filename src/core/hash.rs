// Hashing utilities

use sha2::{Sha256, Digest};
use crate::core::Hash256;

/// Single SHA256 of the given bytes
pub fn sha256(data: &[u8]) -> Hash256 {
    let hash = Sha256::digest(data);
    Hash256::from_slice(&hash).expect("SHA256 always returns 32 bytes")
}

/// SHA256 over the concatenation of several parts, without building
/// the joined string first
pub fn sha256_concat(parts: &[&[u8]]) -> Hash256 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    Hash256::from_slice(&hasher.finalize()).expect("SHA256 always returns 32 bytes")
}
