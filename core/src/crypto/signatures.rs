//! # Digital Signatures
//!
//! Ed25519 verification over raw bytes, the client-side half of state
//! signing. Signing itself lives on [`SigningKeypair`](super::keys::SigningKeypair)
//! because only the server ever holds a private key.
//!
//! Everything here is a pure function: no state, no I/O. A client that got
//! a signature and a public key off the wire calls [`verify_raw`]; a caller
//! that already parsed the key calls [`verify`].
//!
//! We use `verify_strict`, which rejects small-order public keys and
//! non-canonical signatures that lenient implementations accept.

use ed25519_dalek::{Signature, VerifyingKey, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
use thiserror::Error;

/// Errors during signature verification.
///
/// Intentionally vague: we don't tell attackers *why* verification failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("signature verification failed")]
    VerificationFailed,

    #[error("invalid signature bytes: expected {SIGNATURE_LENGTH} bytes")]
    InvalidSignatureBytes,

    #[error("invalid public key")]
    InvalidPublicKey,
}

/// Parse a raw 32-byte Ed25519 public key.
pub fn parse_public_key(bytes: &[u8]) -> Result<VerifyingKey, SignatureError> {
    let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes
        .try_into()
        .map_err(|_| SignatureError::InvalidPublicKey)?;
    VerifyingKey::from_bytes(&bytes).map_err(|_| SignatureError::InvalidPublicKey)
}

/// Verify a signature against an already-parsed public key.
///
/// Returns `true` only for a well-formed, valid signature. Wrong length,
/// wrong key, and tampered message are all just `false`.
pub fn verify(public_key: &VerifyingKey, message: &[u8], signature: &[u8]) -> bool {
    let Ok(sig_bytes) = <[u8; SIGNATURE_LENGTH]>::try_from(signature) else {
        return false;
    };
    public_key
        .verify_strict(message, &Signature::from_bytes(&sig_bytes))
        .is_ok()
}

/// Verify a signature using raw byte components off the wire.
pub fn verify_raw(
    public_key_bytes: &[u8],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), SignatureError> {
    let public_key = parse_public_key(public_key_bytes)?;
    let sig_bytes: [u8; SIGNATURE_LENGTH] = signature_bytes
        .try_into()
        .map_err(|_| SignatureError::InvalidSignatureBytes)?;

    public_key
        .verify_strict(message, &Signature::from_bytes(&sig_bytes))
        .map_err(|_| SignatureError::VerificationFailed)
}
