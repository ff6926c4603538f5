//! Content hashing for catalog drift detection.

use sha2::{Digest, Sha256};

/// Hash an expanded item list into a hex digest.
///
/// Each entry is length-prefixed before hashing so `["ab"]` and `["a", "b"]`
/// produce different digests. The catalog reader is deterministic in its
/// underlying configuration, so equal configuration always yields an equal
/// digest here.
pub fn hash_items(items: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"spindeck-items"); // Domain separator
    for item in items {
        hasher.update((item.len() as u64).to_be_bytes());
        hasher.update(item.as_bytes());
    }
    hex::encode(hasher.finalize())
}
