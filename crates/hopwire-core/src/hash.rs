use sha2::{Digest, Sha256};

/// Computes SHA-256 and returns the fixed-size 32-byte digest.
pub fn sha256_32(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// Convenience for the common `SHA256(a || b)` shape used by the hash chain
/// and proof-of-work puzzle.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let input = b"hopwire";
        assert_eq!(sha256_32(input), sha256_32(input));
    }

    #[test]
    fn hash_changes_when_input_changes() {
        assert_ne!(sha256_32(b"hopwire-a"), sha256_32(b"hopwire-b"));
    }

    #[test]
    fn concat_matches_manual_concatenation() {
        let a = b"abc";
        let b = b"def";
        let mut joined = Vec::new();
        joined.extend_from_slice(a);
        joined.extend_from_slice(b);
        assert_eq!(sha256_concat(&[a, b]), sha256_32(&joined));
    }
}
