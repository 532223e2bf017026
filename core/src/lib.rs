// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Veritas: Core Library
//!
//! The trust and concurrency core of a tamper-evident data store. Two jobs:
//!
//! 1. **Prove things.** Every committed transaction is a leaf in an
//!    append-only Merkle accumulator. A client that trusted the log at
//!    transaction `i` can be handed an entry plus a dual proof and check,
//!    without trusting the server, that the entry exists at `j >= i` and
//!    that nothing it saw before has been rewritten.
//! 2. **Keep sessions honest.** Per-client sessions hold any number of
//!    read-only transactions and at most one read-write transaction, and
//!    never disappear without rolling back what they hold.
//!
//! ## Architecture
//!
//! - **crypto**: SHA-256 hashing and Ed25519 keys/signatures.
//! - **merkle**: The accumulator: roots, inclusion and consistency proofs.
//! - **state**: `ImmutableState` and the server-side `StateSigner`.
//! - **ledger**: Entries, transaction headers, the in-memory `TxLog`.
//! - **engine**: `Database`/`EngineTx` traits and the in-memory engine.
//! - **session**: `SessionManager`, sessions, transactions, teardown.
//! - **verification**: Client-side proof checking and the `Verifier`.
//! - **document**: JSON collections on top of the engine, with proofs.
//! - **config**: Constants and `SessionConfig`.
//!
//! ## Ground rules
//!
//! 1. The verifier trusts nothing it did not recompute.
//! 2. Locks guard bookkeeping only. Engine work runs unlocked.
//! 3. Services are constructed explicitly and shared by `Arc`. No globals.

pub mod config;
pub mod crypto;
pub mod document;
pub mod engine;
pub mod ledger;
pub mod merkle;
pub mod session;
pub mod state;
pub mod verification;

pub use config::SessionConfig;
pub use engine::{Database, EngineError, EngineTx, ExecOutcome, MemoryDatabase, Operation, TxMode};
pub use ledger::{DualProof, Entry, LedgerError, ProofSource, TxHeader, TxLog, VerifiableEntry};
pub use session::{RollbackFailures, Session, SessionError, SessionManager, User};
pub use state::{ImmutableState, StateSignature, StateSigner};
pub use verification::{verify_inclusion_and_consistency, VerificationError, Verifier};
