//! # Transaction Accumulator
//!
//! A binary Merkle tree over transaction leaf hashes, plus the two proof
//! kinds that make the log tamper-evident:
//!
//! ```text
//! tree.rs  : append-only tree, roots of any prefix, proof generation
//! proof.rs : InclusionProof / ConsistencyProof and their verification
//! ```
//!
//! The accumulator is the oracle behind every dual proof: an inclusion
//! proof shows a transaction is inside the target root, a consistency
//! proof shows the source root is a prefix of the target root.

pub mod proof;
pub mod tree;

pub use proof::{ConsistencyProof, InclusionProof};
pub use tree::{root_of, MerkleTree, TreeError};
