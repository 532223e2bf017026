//! # Hashing Utilities
//!
//! Every digest in Veritas is SHA-256. Entries, transaction headers, and the
//! internal nodes of the transaction accumulator all go through the helpers
//! in this file, so the whole trust model rests on the handful of functions
//! below.
//!
//! ## Domain separation
//!
//! Leaves and interior nodes are hashed with different one-byte prefixes,
//! the same construction Certificate Transparency uses (RFC 6962):
//!
//! ```text
//! leaf  = SHA-256(0x00 || data)
//! node  = SHA-256(0x01 || left || right)
//! empty = SHA-256("")
//! ```
//!
//! Without the prefixes an attacker could present an interior node as if
//! it were a leaf and forge an inclusion proof for data that was never
//! appended.

use sha2::{Digest, Sha256};

use crate::config::HASH_LENGTH;

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; HASH_LENGTH];

/// Prefix byte for leaf hashes.
pub const LEAF_PREFIX: u8 = 0x00;

/// Prefix byte for interior node hashes.
pub const NODE_PREFIX: u8 = 0x01;

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use veritas_core::crypto::sha256;
///
/// let hash = sha256(b"veritas");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash multiple byte slices together without concatenation overhead.
///
/// Feeding the parts sequentially yields the same digest as hashing their
/// concatenation, minus the temporary buffer.
pub fn sha256_multi(parts: &[&[u8]]) -> Hash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Hash a leaf: `SHA-256(0x00 || data)`.
pub fn leaf_hash(data: &[u8]) -> Hash {
    sha256_multi(&[&[LEAF_PREFIX], data])
}

/// Hash an interior node from its two children, left first.
pub fn node_hash(left: &Hash, right: &Hash) -> Hash {
    sha256_multi(&[&[NODE_PREFIX], left.as_slice(), right.as_slice()])
}

/// Root of the empty tree: `SHA-256("")`.
pub fn empty_root() -> Hash {
    sha256(b"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let hash = sha256(b"");
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(hash.as_slice(), expected.as_slice());
    }

    #[test]
    fn sha256_multi_matches_concatenation() {
        let multi = sha256_multi(&[b"hello", b" world"]);
        assert_eq!(multi, sha256(b"hello world"));
    }

    #[test]
    fn leaf_and_node_are_domain_separated() {
        // A 65-byte leaf whose payload looks like "left || right" must not
        // collide with the interior node built from the same children.
        let left = sha256(b"left");
        let right = sha256(b"right");
        let mut payload = vec![NODE_PREFIX];
        payload.extend_from_slice(&left);
        payload.extend_from_slice(&right);

        assert_ne!(leaf_hash(&payload[1..]), node_hash(&left, &right));
        assert_ne!(leaf_hash(b"data"), sha256(b"data"));
    }

    #[test]
    fn node_hash_order_matters() {
        let a = sha256(b"a");
        let b = sha256(b"b");
        assert_ne!(node_hash(&a, &b), node_hash(&b, &a));
    }

    #[test]
    fn empty_root_is_hash_of_nothing() {
        assert_eq!(empty_root(), sha256(&[]));
    }
}
