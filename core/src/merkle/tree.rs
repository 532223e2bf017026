//! Append-only Merkle tree over transaction leaf hashes.
//!
//! The tree follows the RFC 6962 shape: a tree of `n > 1` leaves splits at
//! `k`, the largest power of two strictly smaller than `n`, into a complete
//! left subtree of `k` leaves and a right subtree holding the rest.
//! Because the left subtree is always complete, the root of any prefix of
//! the log can be recomputed from the leaves alone, which is what makes
//! consistency proofs possible.
//!
//! Appends keep the frontier: the roots of the perfect subtrees that make
//! up the tree, largest first. Once a perfect subtree is complete its root
//! never changes, so `push` merges at most `log2(n)` pairs and the current
//! root is cached. Roots of older sizes and proof paths are still rebuilt
//! from the stored leaves.

use thiserror::Error;

use super::proof::{ConsistencyProof, InclusionProof};
use crate::crypto::hash::{empty_root, node_hash, Hash};

/// Errors raised when a proof is requested for sizes the tree cannot serve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("leaf index {index} out of range for tree size {size}")]
    IndexOutOfRange { index: u64, size: u64 },

    #[error("tree size {requested} exceeds current size {current}")]
    SizeOutOfRange { requested: u64, current: u64 },

    #[error("old size {old} is larger than new size {new}")]
    InvertedRange { old: u64, new: u64 },
}

/// An append-only Merkle tree. Leaves are stored already hashed
/// (`SHA-256(0x00 || data)`).
#[derive(Debug, Clone)]
pub struct MerkleTree {
    leaves: Vec<Hash>,
    /// `(leaf count, root)` of each frozen perfect subtree, sizes strictly
    /// decreasing and summing to `leaves.len()`.
    frontier: Vec<(u64, Hash)>,
    root: Hash,
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self {
            leaves: Vec::new(),
            frontier: Vec::new(),
            root: empty_root(),
        }
    }
}

impl MerkleTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a leaf hash and return the new tree size.
    pub fn push(&mut self, leaf: Hash) -> u64 {
        self.leaves.push(leaf);

        let mut size = 1u64;
        let mut hash = leaf;
        while let Some(&(left_size, left)) = self.frontier.last() {
            if left_size != size {
                break;
            }
            self.frontier.pop();
            hash = node_hash(&left, &hash);
            size <<= 1;
        }
        self.frontier.push((size, hash));
        self.root = fold_frontier(&self.frontier);

        self.leaves.len() as u64
    }

    pub fn len(&self) -> u64 {
        self.leaves.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Root over the current leaves.
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Root of the tree as it was when it held `size` leaves.
    pub fn root_at(&self, size: u64) -> Result<Hash, TreeError> {
        let prefix = self.prefix(size)?;
        if size == self.len() {
            return Ok(self.root);
        }
        Ok(root_of(prefix))
    }

    /// Audit path proving that leaf `index` is part of the tree of `size`.
    pub fn inclusion_proof(&self, index: u64, size: u64) -> Result<InclusionProof, TreeError> {
        let prefix = self.prefix(size)?;
        if index >= size {
            return Err(TreeError::IndexOutOfRange { index, size });
        }
        let mut path = Vec::new();
        audit_path(index as usize, prefix, &mut path);
        Ok(InclusionProof {
            leaf_index: index,
            tree_size: size,
            path,
        })
    }

    /// Proof that the tree of `old_size` is a prefix of the tree of
    /// `new_size`.
    pub fn consistency_proof(
        &self,
        old_size: u64,
        new_size: u64,
    ) -> Result<ConsistencyProof, TreeError> {
        if old_size > new_size {
            return Err(TreeError::InvertedRange {
                old: old_size,
                new: new_size,
            });
        }
        let prefix = self.prefix(new_size)?;
        let mut path = Vec::new();
        if old_size > 0 && old_size < new_size {
            subproof(old_size as usize, prefix, true, &mut path);
        }
        Ok(ConsistencyProof {
            old_size,
            new_size,
            path,
        })
    }

    fn prefix(&self, size: u64) -> Result<&[Hash], TreeError> {
        if size > self.len() {
            return Err(TreeError::SizeOutOfRange {
                requested: size,
                current: self.len(),
            });
        }
        Ok(&self.leaves[..size as usize])
    }
}

/// Merkle tree hash over a slice of leaf hashes.
pub fn root_of(leaves: &[Hash]) -> Hash {
    match leaves.len() {
        0 => empty_root(),
        1 => leaves[0],
        n => {
            let k = split_point(n);
            node_hash(&root_of(&leaves[..k]), &root_of(&leaves[k..]))
        }
    }
}

/// Root over a frontier: each subtree is the left child of everything
/// smaller to its right.
fn fold_frontier(frontier: &[(u64, Hash)]) -> Hash {
    let mut nodes = frontier.iter().rev();
    let Some(&(_, mut acc)) = nodes.next() else {
        return empty_root();
    };
    for (_, left) in nodes {
        acc = node_hash(left, &acc);
    }
    acc
}

/// Largest power of two strictly smaller than `n` (`n >= 2`).
fn split_point(n: usize) -> usize {
    let mut k = 1;
    while k << 1 < n {
        k <<= 1;
    }
    k
}

fn audit_path(index: usize, leaves: &[Hash], path: &mut Vec<Hash>) {
    let n = leaves.len();
    if n <= 1 {
        return;
    }
    let k = split_point(n);
    if index < k {
        audit_path(index, &leaves[..k], path);
        path.push(root_of(&leaves[k..]));
    } else {
        audit_path(index - k, &leaves[k..], path);
        path.push(root_of(&leaves[..k]));
    }
}

// `complete` is true while the old tree is still a complete subtree we
// started from; its root is then known to the verifier and omitted.
fn subproof(m: usize, leaves: &[Hash], complete: bool, path: &mut Vec<Hash>) {
    let n = leaves.len();
    if m == n {
        if !complete {
            path.push(root_of(leaves));
        }
        return;
    }
    let k = split_point(n);
    if m <= k {
        subproof(m, &leaves[..k], complete, path);
        path.push(root_of(&leaves[k..]));
    } else {
        subproof(m - k, &leaves[k..], false, path);
        path.push(root_of(&leaves[..k]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::leaf_hash;

    fn tree_with(n: u8) -> MerkleTree {
        let mut tree = MerkleTree::new();
        for i in 0..n {
            tree.push(leaf_hash(&[i]));
        }
        tree
    }

    #[test]
    fn split_point_is_largest_power_below() {
        assert_eq!(split_point(2), 1);
        assert_eq!(split_point(3), 2);
        assert_eq!(split_point(4), 2);
        assert_eq!(split_point(5), 4);
        assert_eq!(split_point(8), 4);
        assert_eq!(split_point(9), 8);
    }

    #[test]
    fn empty_tree_root() {
        assert_eq!(MerkleTree::new().root(), empty_root());
    }

    #[test]
    fn three_leaf_root_shape() {
        let tree = tree_with(3);
        let l: Vec<Hash> = (0..3u8).map(|i| leaf_hash(&[i])).collect();
        let expected = node_hash(&node_hash(&l[0], &l[1]), &l[2]);
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn cached_root_tracks_full_recomputation() {
        let mut tree = MerkleTree::new();
        let mut leaves = Vec::new();
        for i in 0..70u8 {
            let leaf = leaf_hash(&[i]);
            leaves.push(leaf);
            tree.push(leaf);
            assert_eq!(tree.root(), root_of(&leaves), "size {}", leaves.len());
            // One frozen subtree per set bit of the size.
            assert_eq!(tree.frontier.len() as u32, tree.len().count_ones());
        }
        assert_eq!(tree.root_at(70).unwrap(), root_of(&leaves));
    }

    #[test]
    fn root_at_matches_smaller_tree() {
        let big = tree_with(7);
        for size in 0..=7u8 {
            assert_eq!(big.root_at(size as u64).unwrap(), tree_with(size).root());
        }
    }

    #[test]
    fn inclusion_path_for_three_leaves() {
        let tree = tree_with(3);
        let l: Vec<Hash> = (0..3u8).map(|i| leaf_hash(&[i])).collect();
        let proof = tree.inclusion_proof(0, 3).unwrap();
        assert_eq!(proof.path, vec![l[1], l[2]]);
        let proof = tree.inclusion_proof(2, 3).unwrap();
        assert_eq!(proof.path, vec![node_hash(&l[0], &l[1])]);
    }

    #[test]
    fn inclusion_proof_rejects_bad_ranges() {
        let tree = tree_with(4);
        assert_eq!(
            tree.inclusion_proof(4, 4),
            Err(TreeError::IndexOutOfRange { index: 4, size: 4 })
        );
        assert!(matches!(
            tree.inclusion_proof(0, 5),
            Err(TreeError::SizeOutOfRange { .. })
        ));
    }

    #[test]
    fn consistency_path_three_to_four() {
        let tree = tree_with(4);
        let l: Vec<Hash> = (0..4u8).map(|i| leaf_hash(&[i])).collect();
        let proof = tree.consistency_proof(3, 4).unwrap();
        assert_eq!(proof.path, vec![l[2], l[3], node_hash(&l[0], &l[1])]);
    }

    #[test]
    fn consistency_proof_trivial_cases_are_empty() {
        let tree = tree_with(5);
        assert!(tree.consistency_proof(5, 5).unwrap().path.is_empty());
        assert!(tree.consistency_proof(0, 5).unwrap().path.is_empty());
        assert!(matches!(
            tree.consistency_proof(4, 3),
            Err(TreeError::InvertedRange { old: 4, new: 3 })
        ));
    }
}
