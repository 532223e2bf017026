//! # Immutable State
//!
//! An [`ImmutableState`] is the trust anchor of the whole system: the
//! accumulator root after a given transaction, optionally signed by the
//! server. Clients persist the last state they verified and check every
//! later proof against it.
//!
//! ## Canonical bytes
//!
//! The signature covers exactly 40 bytes:
//!
//! ```text
//! ┌──────────────────────┬────────────────────────────┐
//! │ tx_id  (u64, BE, 8B) │ root_hash (SHA-256, 32B)   │
//! └──────────────────────┴────────────────────────────┘
//! ```
//!
//! The signature itself is never part of the signed bytes.

pub mod signer;

use serde::{Deserialize, Serialize};

use crate::config::HASH_LENGTH;
use crate::crypto::hash::{empty_root, Hash};

pub use signer::{verify_embedded_signature, verify_state_signature, StateSigner};

/// Length of [`ImmutableState::to_bytes`].
pub const CANONICAL_STATE_LEN: usize = 8 + HASH_LENGTH;

/// A signature over a state's canonical bytes, with the key that made it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSignature {
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
}

/// Snapshot of the log at a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImmutableState {
    pub tx_id: u64,
    pub root_hash: Hash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<StateSignature>,
}

impl ImmutableState {
    /// An unsigned state.
    pub fn new(tx_id: u64, root_hash: Hash) -> Self {
        Self {
            tx_id,
            root_hash,
            signature: None,
        }
    }

    /// The state of a log with no committed transactions.
    pub fn genesis() -> Self {
        Self::new(0, empty_root())
    }

    /// Canonical byte form: `tx_id` big-endian, then the root hash.
    pub fn to_bytes(&self) -> [u8; CANONICAL_STATE_LEN] {
        let mut out = [0u8; CANONICAL_STATE_LEN];
        out[..8].copy_from_slice(&self.tx_id.to_be_bytes());
        out[8..].copy_from_slice(&self.root_hash);
        out
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn root_hex(&self) -> String {
        hex::encode(self.root_hash)
    }
}
