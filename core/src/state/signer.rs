//! # State Signer
//!
//! Holds the server's Ed25519 key and signs [`ImmutableState`]s on demand.
//!
//! The signer is constructed once at startup and shared by `Arc` with
//! whatever needs to sign. Malformed key material fails at construction;
//! once a `StateSigner` exists, signing cannot fail.

use std::path::Path;

use ed25519_dalek::VerifyingKey;
use tracing::info;

use super::{ImmutableState, StateSignature};
use crate::crypto::keys::{KeyError, SigningKeypair};
use crate::crypto::signatures::{self, SignatureError};
use crate::ledger::VerifiableEntry;

/// Signs root states with a process-wide Ed25519 key.
#[derive(Debug)]
pub struct StateSigner {
    keypair: SigningKeypair,
}

impl StateSigner {
    pub fn new(keypair: SigningKeypair) -> Self {
        Self { keypair }
    }

    /// Load the signing key from a PEM or hex-seed file.
    pub fn from_key_file<P: AsRef<Path>>(path: P) -> Result<Self, KeyError> {
        let keypair = SigningKeypair::from_file(path.as_ref())?;
        info!(
            path = %path.as_ref().display(),
            public_key = %keypair.public_key_hex(),
            "state signing key loaded"
        );
        Ok(Self::new(keypair))
    }

    pub fn generate() -> Self {
        Self::new(SigningKeypair::generate())
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self::new(SigningKeypair::from_seed(seed))
    }

    pub fn public_key(&self) -> VerifyingKey {
        self.keypair.verifying_key()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.keypair.public_key_bytes()
    }

    /// Sign arbitrary canonical bytes.
    pub fn sign(&self, canonical: &[u8]) -> StateSignature {
        StateSignature {
            signature: self.keypair.sign(canonical),
            public_key: self.keypair.public_key_bytes().to_vec(),
        }
    }

    /// Return `state` with a fresh signature over its canonical bytes.
    /// Any signature already attached is replaced.
    pub fn sign_state(&self, mut state: ImmutableState) -> ImmutableState {
        state.signature = Some(self.sign(&state.to_bytes()));
        state
    }

    /// Attach a signature over the proof's target state.
    pub fn sign_entry_proof(&self, mut proof: VerifiableEntry) -> VerifiableEntry {
        let target = proof.target_state();
        proof.target_signature = Some(self.sign(&target.to_bytes()));
        proof
    }
}

/// Verify a state signature. Pure; used by the server as a self-check and
/// by clients to establish trust.
pub fn verify_state_signature(
    canonical: &[u8],
    signature: &[u8],
    public_key: &VerifyingKey,
) -> bool {
    signatures::verify(public_key, canonical, signature)
}

/// Verify the signature carried by `state` against the key embedded in it.
pub fn verify_embedded_signature(state: &ImmutableState) -> Result<(), SignatureError> {
    let sig = state
        .signature
        .as_ref()
        .ok_or(SignatureError::VerificationFailed)?;
    signatures::verify_raw(&sig.public_key, &state.to_bytes(), &sig.signature)
}
