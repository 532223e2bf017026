//! A transaction opened inside a session.
//!
//! ```text
//!            commit ──▶ Committed
//! Ongoing ──┤
//!            rollback ─▶ RolledBack
//! ```
//!
//! Terminal states are final. The engine handle is taken out on the
//! first terminal call, so a second call finds nothing to operate on and
//! fails with [`SessionError::TransactionNotFound`]. A failed engine commit
//! still consumes the handle and leaves the transaction `RolledBack`.

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::SessionError;
use crate::engine::{EngineTx, ExecOutcome, Operation, TxMode};
use crate::ledger::TxHeader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
    Ongoing,
    Committed,
    RolledBack,
}

struct TxInner {
    state: TxState,
    engine: Option<Box<dyn EngineTx>>,
}

/// One open transaction. Shared by `Arc` between the session map and
/// whoever is executing against it.
pub struct Transaction {
    id: String,
    mode: TxMode,
    session_id: String,
    inner: Mutex<TxInner>,
}

impl Transaction {
    pub(crate) fn new(
        id: String,
        mode: TxMode,
        session_id: String,
        engine: Box<dyn EngineTx>,
    ) -> Self {
        Self {
            id,
            mode,
            session_id,
            inner: Mutex::new(TxInner {
                state: TxState::Ongoing,
                engine: Some(engine),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> TxMode {
        self.mode
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> TxState {
        self.inner.lock().state
    }

    pub fn is_terminal(&self) -> bool {
        self.state() != TxState::Ongoing
    }

    /// Execute one operation. Fails with `TransactionNotFound` once the
    /// transaction has been committed or rolled back.
    pub fn exec(&self, op: Operation) -> Result<ExecOutcome, SessionError> {
        let mut inner = self.inner.lock();
        let engine = inner
            .engine
            .as_mut()
            .ok_or(SessionError::TransactionNotFound)?;
        Ok(engine.exec(op)?)
    }

    pub(crate) fn commit(&self) -> Result<Option<TxHeader>, SessionError> {
        let mut inner = self.inner.lock();
        let engine = inner
            .engine
            .take()
            .ok_or(SessionError::TransactionNotFound)?;
        match engine.commit() {
            Ok(header) => {
                inner.state = TxState::Committed;
                debug!(
                    transaction_id = %self.id,
                    session_id = %self.session_id,
                    log_tx = ?header.as_ref().map(|h| h.id),
                    "transaction committed"
                );
                Ok(header)
            }
            Err(e) => {
                inner.state = TxState::RolledBack;
                Err(e.into())
            }
        }
    }

    pub(crate) fn rollback(&self) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        let engine = inner
            .engine
            .take()
            .ok_or(SessionError::TransactionNotFound)?;
        inner.state = TxState::RolledBack;
        engine.rollback()?;
        debug!(
            transaction_id = %self.id,
            session_id = %self.session_id,
            "transaction rolled back"
        );
        Ok(())
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("session_id", &self.session_id)
            .field("state", &self.state())
            .finish()
    }
}
