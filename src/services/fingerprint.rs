use sha2::{Digest, Sha256};

/// SHA-256 of normalized filing text, hex encoded. Independent of how the
/// document was discovered, so it keys cross-entry-point reuse.
pub fn content_hash(normalized_text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_text.as_bytes());
    hex::encode(hasher.finalize())
}
