//! Stateful verifier that remembers the last state it trusted.

use ed25519_dalek::VerifyingKey;
use tracing::debug;

use super::{verify_inclusion_and_consistency, VerificationError};
use crate::ledger::{Entry, VerifiableEntry};
use crate::state::ImmutableState;

/// Client-side trust anchor.
///
/// Every successful [`verify`](Verifier::verify) moves the trusted state
/// forward to the proof's target; a failed one leaves it untouched. Trust
/// therefore only ever ratchets forward.
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    trusted: Option<ImmutableState>,
    server_key: Option<VerifyingKey>,
}

impl Verifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require every target state to be signed by `key`.
    pub fn with_server_key(mut self, key: VerifyingKey) -> Self {
        self.server_key = Some(key);
        self
    }

    /// Resume from a state persisted by an earlier run.
    pub fn with_trusted_state(mut self, state: ImmutableState) -> Self {
        self.trusted = Some(state);
        self
    }

    pub fn trusted_state(&self) -> Option<&ImmutableState> {
        self.trusted.as_ref()
    }

    /// Transaction id proofs should be requested `since`.
    pub fn since(&self) -> Option<u64> {
        self.trusted.as_ref().map(|s| s.tx_id)
    }

    pub fn verify(
        &mut self,
        entry: &Entry,
        proof: &VerifiableEntry,
    ) -> Result<&ImmutableState, VerificationError> {
        let state = verify_inclusion_and_consistency(
            entry,
            proof,
            self.trusted.as_ref(),
            self.server_key.as_ref(),
        )?;
        debug!(
            from = ?self.since(),
            to = state.tx_id,
            "trusted state advanced"
        );
        Ok(self.trusted.insert(state))
    }
}
