use blake2::{Blake2b512, Digest};

use concord_types::Hash;

/// Blake2b digest truncated to 32 bytes, matching the hash type used
/// throughout the data model.
pub fn blake2b_256(data: &[u8]) -> Hash {
    let mut hasher = Blake2b512::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..32]);
    Hash(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_sensitive_to_input() {
        let a = blake2b_256(b"hello");
        let b = blake2b_256(b"hello");
        let c = blake2b_256(b"hellp");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
