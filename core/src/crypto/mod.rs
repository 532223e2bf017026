//! # Cryptographic Primitives
//!
//! The foundation of the verification engine. Every digest and every
//! signature in Veritas flows through here.
//!
//! - **SHA-256** for entries, transaction headers and the accumulator.
//! - **Ed25519** for signing root states.
//!
//! Everything in this module is a thin, type-safe wrapper around audited
//! implementations (`sha2`, `ed25519-dalek`). No hand-rolled primitives.

pub mod hash;
pub mod keys;
pub mod signatures;

pub use hash::{empty_root, leaf_hash, node_hash, sha256, sha256_multi, Hash};
pub use keys::{KeyError, SigningKeypair};
pub use signatures::{parse_public_key, verify, verify_raw, SignatureError};
