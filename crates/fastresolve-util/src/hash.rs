/// Number of hex characters kept by [`content_hash`].
pub const CONTENT_HASH_LEN: usize = 32;

/// Compute the BLAKE3 hash of a byte slice, returning the hex-encoded digest.
#[must_use]
pub fn blake3_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Short, stable hash of a string used to name generated artifacts.
///
/// The first [`CONTENT_HASH_LEN`] hex characters of the BLAKE3 digest. Stable
/// across processes and platforms for the same input.
#[must_use]
pub fn content_hash(contents: &str) -> String {
    let mut hex = blake3_bytes(contents.as_bytes());
    hex.truncate(CONTENT_HASH_LEN);
    hex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake3_bytes() {
        let hash = blake3_bytes(b"hello world");
        assert_eq!(
            hash,
            "d74981efa70a0c880b8d8c1985d075dbcbf679b99a5f9914e5aaf96b831a9e24"
        );
    }

    #[test]
    fn test_content_hash_is_truncated_digest() {
        let hash = content_hash("hello world");
        assert_eq!(hash.len(), CONTENT_HASH_LEN);
        assert_eq!(hash, "d74981efa70a0c880b8d8c1985d075db");
    }

    #[test]
    fn test_content_hash_differs_for_different_input() {
        assert_ne!(content_hash("a"), content_hash("b"));
    }
}
