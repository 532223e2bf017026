//! In-memory reference engine.
//!
//! Writes are buffered per transaction and appended to the shared
//! [`TxLog`] as one log transaction on commit. Reads inside a read-write
//! transaction see that transaction's own buffered writes first.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::{Database, EngineError, EngineTx, ExecOutcome, Operation, TxMode};
use crate::ledger::{DualProof, Entry, LedgerError, ProofSource, TxHeader, TxLog, VerifiableEntry};
use crate::state::ImmutableState;

/// A named database over an in-memory transaction log.
#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    log: Arc<TxLog>,
    closed: AtomicBool,
}

impl MemoryDatabase {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_log(name, Arc::new(TxLog::new()))
    }

    /// A database sharing an existing log.
    pub fn with_log(name: impl Into<String>, log: Arc<TxLog>) -> Self {
        Self {
            name: name.into(),
            log,
            closed: AtomicBool::new(false),
        }
    }

    pub fn log(&self) -> &Arc<TxLog> {
        &self.log
    }

    /// Refuse new transactions from now on. Open ones are unaffected.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self, mode: TxMode) -> Result<Box<dyn EngineTx>, EngineError> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }
        Ok(Box::new(MemoryTx {
            mode,
            log: Arc::clone(&self.log),
            writes: BTreeMap::new(),
        }))
    }
}

impl ProofSource for MemoryDatabase {
    fn current_state(&self) -> ImmutableState {
        self.log.current_state()
    }

    fn tx_header(&self, id: u64) -> Result<TxHeader, LedgerError> {
        self.log.tx_header(id)
    }

    fn proof_between(&self, source: u64, target: u64) -> Result<DualProof, LedgerError> {
        self.log.proof_between(source, target)
    }

    fn verifiable_entry(
        &self,
        key: &[u8],
        since: Option<u64>,
    ) -> Result<VerifiableEntry, LedgerError> {
        self.log.verifiable_entry(key, since)
    }
}

/// Engine transaction of a [`MemoryDatabase`].
struct MemoryTx {
    mode: TxMode,
    log: Arc<TxLog>,
    writes: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl EngineTx for MemoryTx {
    fn mode(&self) -> TxMode {
        self.mode
    }

    fn exec(&mut self, op: Operation) -> Result<ExecOutcome, EngineError> {
        match op {
            Operation::Set { key, value } => {
                if !self.mode.is_read_write() {
                    return Err(EngineError::ReadOnly);
                }
                self.writes.insert(key, value);
                Ok(ExecOutcome::Written)
            }
            Operation::Get { key } => {
                if let Some(value) = self.writes.get(&key) {
                    return Ok(ExecOutcome::Value(value.clone()));
                }
                match self.log.get(&key) {
                    Ok((value, _)) => Ok(ExecOutcome::Value(value)),
                    Err(LedgerError::KeyNotFound) => Err(EngineError::KeyNotFound),
                    Err(e) => Err(e.into()),
                }
            }
        }
    }

    fn commit(self: Box<Self>) -> Result<Option<TxHeader>, EngineError> {
        let MemoryTx { log, writes, .. } = *self;
        if writes.is_empty() {
            return Ok(None);
        }
        let entries = writes
            .into_iter()
            .map(|(key, value)| Entry { key, value })
            .collect();
        let header = log.commit(entries)?;
        Ok(Some(header))
    }

    fn rollback(self: Box<Self>) -> Result<(), EngineError> {
        debug!(mode = %self.mode, discarded = self.writes.len(), "engine transaction rolled back");
        Ok(())
    }
}
