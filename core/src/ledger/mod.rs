//! # Ledger
//!
//! The append-only transaction log that every proof is built from.
//!
//! ```text
//! types.rs: Entry, TxHeader, DualProof, VerifiableEntry
//! log.rs  : TxLog: in-memory reference log over the Merkle accumulator
//! ```
//!
//! The verification engine does not care how the log is stored. It only
//! needs something that can hand out headers and proofs, which is what
//! [`ProofSource`] captures. [`TxLog`] is the in-memory implementation the
//! rest of the workspace runs against.

pub mod log;
pub mod types;

use thiserror::Error;

use crate::merkle::TreeError;
use crate::state::ImmutableState;

pub use log::TxLog;
pub use types::{DualProof, Entry, TxHeader, VerifiableEntry};

/// Errors raised by the transaction log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("transaction {0} not found")]
    TxNotFound(u64),

    #[error("invalid proof range: source {from} is after target {to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("refusing to commit a transaction with no entries")]
    EmptyTransaction,

    #[error("key not found")]
    KeyNotFound,

    #[error("accumulator error: {0}")]
    Tree(#[from] TreeError),
}

/// Anything that can serve headers and proofs over a transaction log.
pub trait ProofSource: Send + Sync {
    /// Latest committed state, unsigned. The genesis state when empty.
    fn current_state(&self) -> ImmutableState;

    /// Header of transaction `id` (ids start at 1).
    fn tx_header(&self, id: u64) -> Result<TxHeader, LedgerError>;

    /// Dual proof between two transactions: the source transaction's leaf
    /// inside the target root, plus consistency from source to target.
    fn proof_between(&self, source: u64, target: u64) -> Result<DualProof, LedgerError>;

    /// Latest value of `key` with everything needed to verify it against
    /// the state at `since` (or against the current state when `None`).
    fn verifiable_entry(
        &self,
        key: &[u8],
        since: Option<u64>,
    ) -> Result<VerifiableEntry, LedgerError>;
}
