//! Ledger data model: entries, transaction headers and the proof bundles
//! served to clients.
//!
//! ```text
//!   Entry ──canonical──▶ leaf ──entry_proof──▶ entries_root
//!                                                   │
//!                                            TxHeader.leaf_hash
//!                                                   │
//!   source root ──consistency_proof──▶ target root ◀┘ inclusion_proof
//! ```

use serde::{Deserialize, Serialize};

use crate::crypto::hash::{leaf_hash, Hash};
use crate::merkle::{ConsistencyProof, InclusionProof};
use crate::state::{ImmutableState, StateSignature};

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// A single key/value write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Entry {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Length-prefixed encoding: `u32 BE key len || key || u32 BE value len || value`.
    ///
    /// The prefixes keep `("ab", "c")` and `("a", "bc")` distinct.
    pub fn canonical(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.key.len() + self.value.len());
        out.extend_from_slice(&(self.key.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&(self.value.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.value);
        out
    }

    pub fn leaf_hash(&self) -> Hash {
        leaf_hash(&self.canonical())
    }
}

// ---------------------------------------------------------------------------
// Transaction header
// ---------------------------------------------------------------------------

/// Header of one committed transaction.
///
/// `root` is the accumulator root after this transaction was appended, so
/// the header of transaction `n` pins the whole history `1..=n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHeader {
    /// Transaction id, starting at 1.
    pub id: u64,
    /// Commit time, unix milliseconds.
    pub timestamp: u64,
    pub entry_count: u32,
    /// Merkle root over the leaf hashes of this transaction's entries.
    pub entries_root: Hash,
    /// Accumulator root before this transaction.
    pub prev_root: Hash,
    /// Accumulator root after this transaction.
    pub root: Hash,
}

impl TxHeader {
    /// Leaf hash of this header inside the accumulator.
    ///
    /// `root` is excluded since it is derived from this very leaf.
    pub fn leaf_hash(&self) -> Hash {
        let mut buf = Vec::with_capacity(8 + 8 + 4 + 32 + 32);
        buf.extend_from_slice(&self.id.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.entry_count.to_be_bytes());
        buf.extend_from_slice(&self.entries_root);
        buf.extend_from_slice(&self.prev_root);
        leaf_hash(&buf)
    }

    /// Unsigned state as of this transaction.
    pub fn state(&self) -> ImmutableState {
        ImmutableState::new(self.id, self.root)
    }
}

// ---------------------------------------------------------------------------
// Proof bundles
// ---------------------------------------------------------------------------

/// Proof linking two points in the log's history.
///
/// - `inclusion_proof` shows the entry's transaction leaf is part of the
///   tree whose root is `target_tx_header.root`.
/// - `consistency_proof` shows the tree at `source_tx_header` is a prefix
///   of the tree at `target_tx_header`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualProof {
    pub source_tx_header: TxHeader,
    pub target_tx_header: TxHeader,
    pub inclusion_proof: InclusionProof,
    pub consistency_proof: ConsistencyProof,
}

/// Everything a client needs to check one entry against the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiableEntry {
    pub entry: Entry,
    /// Header of the transaction that wrote `entry`.
    pub entry_tx_header: TxHeader,
    /// Entry leaf inside `entry_tx_header.entries_root`.
    pub entry_proof: InclusionProof,
    pub dual_proof: DualProof,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_signature: Option<StateSignature>,
}

impl VerifiableEntry {
    /// The state this proof leads to, with the server signature if any.
    pub fn target_state(&self) -> ImmutableState {
        let target = &self.dual_proof.target_tx_header;
        ImmutableState {
            tx_id: target.id,
            root_hash: target.root,
            signature: self.target_signature.clone(),
        }
    }
}
