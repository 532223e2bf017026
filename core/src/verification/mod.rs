//! # Verification
//!
//! Client-side checking of proofs served by the log. Nothing in here
//! trusts the server: every hash is recomputed and every claimed relation
//! between two states is re-derived from the proof material.
//!
//! ```text
//! dual.rs    : verify_inclusion_and_consistency: one entry, one proof
//! verifier.rs: Verifier: keeps the trusted state and ratchets it forward
//! ```
//!
//! ## What a successful verification means
//!
//! 1. The entry is inside the transaction that claims to have written it.
//! 2. That transaction is inside the target state's accumulator.
//! 3. The client's previously trusted state is a prefix of the target, so
//!    no history the client already saw has been rewritten.
//! 4. If a server key is pinned, the server signed the target state.

pub mod dual;
pub mod verifier;

use std::fmt;

use thiserror::Error;

pub use dual::verify_inclusion_and_consistency;
pub use verifier::Verifier;

/// Why a proof was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The entry handed in is not the entry the proof is about.
    EntryMismatch,
    /// The entry does not hash up to its transaction's entries root.
    EntryInclusion,
    /// The transaction does not hash up to the target root.
    TxInclusion,
    /// The source root is not a prefix of the target root.
    Consistency,
    /// The proof starts from a state other than the trusted one.
    SourceMismatch,
    /// The target is older than the trusted state.
    StaleTarget { trusted: u64, target: u64 },
    /// Structurally invalid proof.
    MalformedProof(String),
    MissingSignature,
    InvalidSignature,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::EntryMismatch => write!(f, "entry does not match proof"),
            FailureReason::EntryInclusion => {
                write!(f, "entry is not included in its transaction")
            }
            FailureReason::TxInclusion => {
                write!(f, "transaction is not included in the target state")
            }
            FailureReason::Consistency => {
                write!(f, "target state is not consistent with the trusted state")
            }
            FailureReason::SourceMismatch => {
                write!(f, "proof source does not match the trusted state")
            }
            FailureReason::StaleTarget { trusted, target } => write!(
                f,
                "target tx {target} is older than trusted tx {trusted}"
            ),
            FailureReason::MalformedProof(detail) => write!(f, "malformed proof: {detail}"),
            FailureReason::MissingSignature => write!(f, "target state is not signed"),
            FailureReason::InvalidSignature => write!(f, "target state signature is invalid"),
        }
    }
}

/// A rejected proof.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("verification failed: {reason}")]
pub struct VerificationError {
    pub reason: FailureReason,
}

impl VerificationError {
    pub fn new(reason: FailureReason) -> Self {
        Self { reason }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(FailureReason::MalformedProof(detail.into()))
    }

    /// Signature problems (missing, forged, wrong key) as opposed to a
    /// broken hash chain.
    pub fn is_signature_failure(&self) -> bool {
        matches!(
            self.reason,
            FailureReason::MissingSignature | FailureReason::InvalidSignature
        )
    }
}

impl From<FailureReason> for VerificationError {
    fn from(reason: FailureReason) -> Self {
        Self::new(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_reason() {
        let err = VerificationError::new(FailureReason::StaleTarget {
            trusted: 9,
            target: 4,
        });
        assert_eq!(
            err.to_string(),
            "verification failed: target tx 4 is older than trusted tx 9"
        );
    }

    #[test]
    fn signature_failures_are_classified() {
        assert!(VerificationError::new(FailureReason::InvalidSignature).is_signature_failure());
        assert!(VerificationError::new(FailureReason::MissingSignature).is_signature_failure());
        assert!(!VerificationError::new(FailureReason::Consistency).is_signature_failure());
    }
}
