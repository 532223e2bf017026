//! # Execution Engine
//!
//! The transactional engine that sessions open transactions against. The
//! session layer only ever sees the two traits here:
//!
//! - [`Database`]: a named database that can `begin` transactions.
//! - [`EngineTx`]: one open engine transaction: `exec`, then exactly one
//!   of `commit` or `rollback`.
//!
//! Both terminal operations take `self: Box<Self>`, so a finished engine
//! transaction cannot be touched again. The type system does the
//! bookkeeping that would otherwise need a runtime flag.
//!
//! [`MemoryDatabase`] is the reference engine backed by the in-memory
//! [`TxLog`](crate::ledger::TxLog).

pub mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ledger::{LedgerError, TxHeader};

pub use memory::MemoryDatabase;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

impl TxMode {
    pub fn is_read_write(self) -> bool {
        matches!(self, TxMode::ReadWrite)
    }
}

impl fmt::Display for TxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxMode::ReadOnly => write!(f, "read_only"),
            TxMode::ReadWrite => write!(f, "read_write"),
        }
    }
}

/// A single operation executed inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Set { key: Vec<u8>, value: Vec<u8> },
    Get { key: Vec<u8> },
}

/// Result of an [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum ExecOutcome {
    Written,
    Value(Vec<u8>),
}

/// Errors raised by the execution engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("write attempted in a read-only transaction")]
    ReadOnly,

    #[error("database is closed")]
    Closed,

    #[error("key not found")]
    KeyNotFound,

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("{0}")]
    Other(String),
}

/// A database that sessions can open transactions against.
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    /// Begin an engine transaction in `mode`.
    fn begin(&self, mode: TxMode) -> Result<Box<dyn EngineTx>, EngineError>;
}

/// One open engine transaction.
pub trait EngineTx: Send {
    fn mode(&self) -> TxMode;

    fn exec(&mut self, op: Operation) -> Result<ExecOutcome, EngineError>;

    /// Make the transaction's writes durable. Returns the header of the
    /// appended log transaction, or `None` when nothing was written.
    fn commit(self: Box<Self>) -> Result<Option<TxHeader>, EngineError>;

    /// Discard the transaction's writes.
    fn rollback(self: Box<Self>) -> Result<(), EngineError>;
}
