//! Inclusion and consistency proofs, and their verification.
//!
//! Verification follows RFC 9162 §2.1.3.2 (inclusion) and §2.1.4.2
//! (consistency). Both walk a bit-position pair `(fn, sn)` down the tree
//! so the verifier never needs to know the tree's full shape, only its
//! size.

use serde::{Deserialize, Serialize};

use crate::crypto::hash::{node_hash, Hash};

/// Audit path from one leaf to the root of a tree of `tree_size` leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionProof {
    /// Zero-based index of the proven leaf.
    pub leaf_index: u64,
    /// Number of leaves in the tree the path leads to.
    pub tree_size: u64,
    /// Sibling hashes, leaf level first.
    pub path: Vec<Hash>,
}

/// Proof that the tree of `old_size` leaves is a prefix of the tree of
/// `new_size` leaves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyProof {
    pub old_size: u64,
    pub new_size: u64,
    pub path: Vec<Hash>,
}

impl InclusionProof {
    /// Recompute the root implied by this path for `leaf`.
    ///
    /// Returns `None` when the path length does not fit the claimed
    /// index and size: too short, too long, or an index past the end.
    pub fn root_from(&self, leaf: &Hash) -> Option<Hash> {
        if self.leaf_index >= self.tree_size {
            return None;
        }
        let mut fnode = self.leaf_index;
        let mut snode = self.tree_size - 1;
        let mut r = *leaf;

        for p in &self.path {
            if snode == 0 {
                return None;
            }
            if fnode & 1 == 1 || fnode == snode {
                r = node_hash(p, &r);
                while fnode & 1 == 0 && fnode != 0 {
                    fnode >>= 1;
                    snode >>= 1;
                }
            } else {
                r = node_hash(&r, p);
            }
            fnode >>= 1;
            snode >>= 1;
        }

        (snode == 0).then_some(r)
    }

    /// True when `leaf` hashes up to `root` along this path.
    pub fn verify(&self, leaf: &Hash, root: &Hash) -> bool {
        self.root_from(leaf).is_some_and(|computed| &computed == root)
    }
}

impl ConsistencyProof {
    /// True when `old_root` (over `old_size` leaves) is a prefix of
    /// `new_root` (over `new_size` leaves).
    pub fn verify(&self, old_root: &Hash, new_root: &Hash) -> bool {
        let (m, n) = (self.old_size, self.new_size);
        if m > n {
            return false;
        }
        if m == n {
            return self.path.is_empty() && old_root == new_root;
        }
        if m == 0 {
            // The empty tree is a prefix of every tree.
            return self.path.is_empty();
        }
        if self.path.is_empty() {
            return false;
        }

        let mut path: Vec<Hash> = Vec::with_capacity(self.path.len() + 1);
        if m.is_power_of_two() {
            path.push(*old_root);
        }
        path.extend_from_slice(&self.path);

        let mut fnode = m - 1;
        let mut snode = n - 1;
        while fnode & 1 == 1 {
            fnode >>= 1;
            snode >>= 1;
        }

        let mut fr = path[0];
        let mut sr = path[0];
        for c in &path[1..] {
            if snode == 0 {
                return false;
            }
            if fnode & 1 == 1 || fnode == snode {
                fr = node_hash(c, &fr);
                sr = node_hash(c, &sr);
                while fnode & 1 == 0 && fnode != 0 {
                    fnode >>= 1;
                    snode >>= 1;
                }
            } else {
                sr = node_hash(&sr, c);
            }
            fnode >>= 1;
            snode >>= 1;
        }

        snode == 0 && &fr == old_root && &sr == new_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::leaf_hash;
    use crate::merkle::MerkleTree;

    fn tree_with(n: u64) -> MerkleTree {
        let mut tree = MerkleTree::new();
        for i in 0..n {
            tree.push(leaf_hash(&i.to_be_bytes()));
        }
        tree
    }

    #[test]
    fn every_inclusion_proof_verifies_in_small_trees() {
        let tree = tree_with(17);
        for size in 1..=17u64 {
            let root = tree.root_at(size).unwrap();
            for index in 0..size {
                let proof = tree.inclusion_proof(index, size).unwrap();
                let leaf = leaf_hash(&index.to_be_bytes());
                assert!(proof.verify(&leaf, &root), "index {index} size {size}");
            }
        }
    }

    #[test]
    fn every_consistency_proof_verifies_in_small_trees() {
        let tree = tree_with(17);
        for new in 1..=17u64 {
            let new_root = tree.root_at(new).unwrap();
            for old in 1..=new {
                let old_root = tree.root_at(old).unwrap();
                let proof = tree.consistency_proof(old, new).unwrap();
                assert!(proof.verify(&old_root, &new_root), "old {old} new {new}");
            }
        }
    }

    #[test]
    fn inclusion_fails_for_wrong_leaf() {
        let tree = tree_with(6);
        let proof = tree.inclusion_proof(3, 6).unwrap();
        assert!(!proof.verify(&leaf_hash(b"imposter"), &tree.root()));
    }

    #[test]
    fn inclusion_bit_flip_in_path_fails() {
        let tree = tree_with(9);
        let leaf = leaf_hash(&5u64.to_be_bytes());
        let proof = tree.inclusion_proof(5, 9).unwrap();
        for step in 0..proof.path.len() {
            for bit in [0u8, 3, 7] {
                let mut tampered = proof.clone();
                tampered.path[step][0] ^= 1 << bit;
                assert!(!tampered.verify(&leaf, &tree.root()));
            }
        }
    }

    #[test]
    fn inclusion_wrong_length_path_fails() {
        let tree = tree_with(8);
        let leaf = leaf_hash(&2u64.to_be_bytes());
        let mut proof = tree.inclusion_proof(2, 8).unwrap();
        proof.path.push([0u8; 32]);
        assert_eq!(proof.root_from(&leaf), None);

        let mut short = tree.inclusion_proof(2, 8).unwrap();
        short.path.pop();
        assert_eq!(short.root_from(&leaf), None);
    }

    #[test]
    fn inclusion_index_past_end_fails() {
        let proof = InclusionProof {
            leaf_index: 4,
            tree_size: 4,
            path: vec![],
        };
        assert!(proof.root_from(&[0u8; 32]).is_none());
    }

    #[test]
    fn consistency_bit_flip_fails() {
        let tree = tree_with(11);
        let old_root = tree.root_at(6).unwrap();
        let new_root = tree.root_at(11).unwrap();
        let proof = tree.consistency_proof(6, 11).unwrap();
        for step in 0..proof.path.len() {
            let mut tampered = proof.clone();
            tampered.path[step][31] ^= 0x80;
            assert!(!tampered.verify(&old_root, &new_root));
        }
    }

    #[test]
    fn consistency_detects_rewritten_history() {
        let honest = tree_with(8);
        let mut forked = MerkleTree::new();
        for i in 0..8u64 {
            let data = if i == 2 { 999u64 } else { i };
            forked.push(leaf_hash(&data.to_be_bytes()));
        }
        let old_root = honest.root_at(4).unwrap();
        let proof = forked.consistency_proof(4, 8).unwrap();
        assert!(!proof.verify(&old_root, &forked.root()));
    }

    #[test]
    fn consistency_inverted_sizes_fail() {
        let proof = ConsistencyProof {
            old_size: 5,
            new_size: 3,
            path: vec![],
        };
        assert!(!proof.verify(&[0u8; 32], &[0u8; 32]));
    }

    #[test]
    fn consistency_equal_sizes_need_equal_roots() {
        let tree = tree_with(4);
        let proof = tree.consistency_proof(4, 4).unwrap();
        assert!(proof.verify(&tree.root(), &tree.root()));
        assert!(!proof.verify(&tree.root(), &tree.root_at(3).unwrap()));
    }
}
