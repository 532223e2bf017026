//! # Sessions & Transactions
//!
//! Per-client sessions and the transactions opened inside them.
//!
//! ```text
//! manager.rs    : SessionManager: create, lookup, heartbeat, eviction, teardown
//! session.rs    : Session + its embedded transaction manager
//! transaction.rs: Transaction: exec, commit, rollback
//! metadata.rs   : session / transaction ids from request metadata
//! errors.rs     : SessionError, RollbackFailures
//! ```
//!
//! ## Guarantees
//!
//! - A session holds any number of read-only transactions and at most one
//!   read-write transaction.
//! - Closing or evicting a session rolls back every transaction it still
//!   holds before the session becomes unreachable.
//! - Rollback failures during teardown are all collected, never
//!   short-circuited.

pub mod errors;
pub mod manager;
pub mod metadata;
#[allow(clippy::module_inception)]
pub mod session;
pub mod transaction;

pub use errors::{RollbackFailures, SessionError};
pub use manager::{EvictionReport, SessionManager};
pub use metadata::{session_id_from_metadata, transaction_id_from_metadata, RequestMetadata};
pub use session::{Session, SessionStatus, User};
pub use transaction::{Transaction, TxState};

pub(crate) mod clock {
    use std::time::Instant;

    /// Current instant. Goes through tokio's clock so paused-time tests
    /// can drive eviction.
    pub fn now() -> Instant {
        tokio::time::Instant::now().into_std()
    }
}
