//! Verification of a single [`VerifiableEntry`].

use ed25519_dalek::VerifyingKey;
use tracing::warn;

use super::{FailureReason, VerificationError};
use crate::crypto::signatures;
use crate::ledger::{Entry, VerifiableEntry};
use crate::state::ImmutableState;

/// Verify `entry` against `proof`, starting from the trusted `prior` state.
///
/// With no prior state the proof must be self-contained (source equal to
/// target). With a `public_key` the target state must carry a valid
/// signature by exactly that key. On success returns the target state,
/// which becomes the caller's new trusted state.
pub fn verify_inclusion_and_consistency(
    entry: &Entry,
    proof: &VerifiableEntry,
    prior: Option<&ImmutableState>,
    public_key: Option<&VerifyingKey>,
) -> Result<ImmutableState, VerificationError> {
    let result = verify(entry, proof, prior, public_key);
    if let Err(e) = &result {
        warn!(
            target_tx = proof.dual_proof.target_tx_header.id,
            trusted_tx = ?prior.map(|p| p.tx_id),
            reason = %e.reason,
            "proof rejected"
        );
    }
    result
}

fn verify(
    entry: &Entry,
    proof: &VerifiableEntry,
    prior: Option<&ImmutableState>,
    public_key: Option<&VerifyingKey>,
) -> Result<ImmutableState, VerificationError> {
    let entry_tx = &proof.entry_tx_header;
    let dual = &proof.dual_proof;
    let source = &dual.source_tx_header;
    let target = &dual.target_tx_header;

    // Entry leaf.
    let leaf = entry.leaf_hash();
    if leaf != proof.entry.leaf_hash() {
        return Err(FailureReason::EntryMismatch.into());
    }

    // Entry inside its transaction.
    if proof.entry_proof.tree_size != u64::from(entry_tx.entry_count) {
        return Err(VerificationError::malformed(
            "entry proof size differs from transaction entry count",
        ));
    }
    if !proof.entry_proof.verify(&leaf, &entry_tx.entries_root) {
        return Err(FailureReason::EntryInclusion.into());
    }

    // Transaction inside the target accumulator.
    if entry_tx.id == 0 || entry_tx.id > target.id {
        return Err(VerificationError::malformed(format!(
            "entry transaction {} outside target {}",
            entry_tx.id, target.id
        )));
    }
    let inclusion = &dual.inclusion_proof;
    if inclusion.leaf_index != entry_tx.id - 1 || inclusion.tree_size != target.id {
        return Err(VerificationError::malformed(
            "inclusion proof does not cover the entry transaction",
        ));
    }
    if !inclusion.verify(&entry_tx.leaf_hash(), &target.root) {
        return Err(FailureReason::TxInclusion.into());
    }
    if entry_tx.id == target.id && entry_tx.root != target.root {
        return Err(FailureReason::TxInclusion.into());
    }

    // Source to target.
    if source.id > target.id {
        return Err(VerificationError::malformed(format!(
            "source {} is after target {}",
            source.id, target.id
        )));
    }
    match prior {
        Some(trusted) => {
            if target.id < trusted.tx_id {
                return Err(FailureReason::StaleTarget {
                    trusted: trusted.tx_id,
                    target: target.id,
                }
                .into());
            }
            if source.id != trusted.tx_id || source.root != trusted.root_hash {
                return Err(FailureReason::SourceMismatch.into());
            }
            let consistency = &dual.consistency_proof;
            if consistency.old_size != source.id || consistency.new_size != target.id {
                return Err(VerificationError::malformed(
                    "consistency proof sizes do not match source and target",
                ));
            }
            if !consistency.verify(&source.root, &target.root) {
                return Err(FailureReason::Consistency.into());
            }
        }
        None => {
            if source != target {
                return Err(FailureReason::SourceMismatch.into());
            }
        }
    }

    let state = proof.target_state();

    // Signature over the target state.
    if let Some(key) = public_key {
        let sig = state
            .signature
            .as_ref()
            .ok_or(FailureReason::MissingSignature)?;
        if sig.public_key.as_slice() != key.as_bytes().as_slice() {
            return Err(FailureReason::InvalidSignature.into());
        }
        if !signatures::verify(key, &state.to_bytes(), &sig.signature) {
            return Err(FailureReason::InvalidSignature.into());
        }
    }

    Ok(state)
}
