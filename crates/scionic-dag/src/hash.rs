//! Hashing utilities using SHA256

use sha2::{Digest, Sha256};

use crate::types::Hash;

/// Compute SHA256 hash of data
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash of a link as fed into a leaf's classic merkle tree: SHA256 over the
/// UTF-8 bytes of the child's CID string
pub fn link_hash(link: &str) -> Hash {
    sha256(link.as_bytes())
}

/// Verify that data matches expected hash
pub fn verify(hash: &Hash, data: &[u8]) -> bool {
    sha256(data) == *hash
}
