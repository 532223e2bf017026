//! A client session and the transaction manager embedded in it.
//!
//! ## Locking
//!
//! One `parking_lot::Mutex` guards every mutable field of a session. It is
//! held only around in-memory bookkeeping: engine `begin`, `commit` and
//! `rollback` always run with the session lock released, so a slow engine
//! never stalls heartbeats or reads of other transactions.
//!
//! ## The read-write slot
//!
//! At most one read-write transaction may be open per session. Opening one
//! is a three-step dance because `begin` runs outside the lock:
//!
//! ```text
//! lock   ─ check Dead, check slot free, reserve slot (pending) ─ unlock
//!          engine.begin(mode)
//! lock   ─ release pending; on success register tx and mark ongoing ─ unlock
//! ```
//!
//! The conflict check happens before `begin`, so a rejected caller never
//! leaves an engine transaction behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use super::clock;
use super::errors::{RollbackFailures, SessionError};
use super::transaction::Transaction;
use crate::config::TX_ID_BYTES;
use crate::engine::{Database, EngineError, ExecOutcome, Operation, TxMode};
use crate::ledger::TxHeader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Idle,
    Dead,
}

/// The authenticated principal that owns a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

struct SessionInner {
    status: SessionStatus,
    database: Arc<dyn Database>,
    last_activity: Instant,
    last_heartbeat: Instant,
    read_write_ongoing: bool,
    /// A read-write `begin` is in flight.
    read_write_pending: bool,
    transactions: HashMap<String, Arc<Transaction>>,
}

pub struct Session {
    id: String,
    user: User,
    created_at: DateTime<Utc>,
    inner: Mutex<SessionInner>,
}

impl Session {
    pub fn new(id: impl Into<String>, user: User, database: Arc<dyn Database>) -> Self {
        let now = clock::now();
        Self {
            id: id.into(),
            user,
            created_at: Utc::now(),
            inner: Mutex::new(SessionInner {
                status: SessionStatus::Active,
                database,
                last_activity: now,
                last_heartbeat: now,
                read_write_ongoing: false,
                read_write_pending: false,
                transactions: HashMap::new(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.lock().status
    }

    #[cfg(test)]
    pub(crate) fn set_status(&self, status: SessionStatus) {
        self.inner.lock().status = status;
    }

    /// Mark the session dead if it has been silent longer than
    /// `dead_timeout` at `now`. Returns `true` only for the caller that made
    /// the transition.
    pub(crate) fn mark_dead_if_silent(&self, now: Instant, dead_timeout: Duration) -> bool {
        let mut inner = self.inner.lock();
        let silent = now.saturating_duration_since(inner.last_heartbeat);
        if inner.status != SessionStatus::Dead && silent > dead_timeout {
            inner.status = SessionStatus::Dead;
            true
        } else {
            false
        }
    }

    /// Move an active session to idle if it has been silent longer than
    /// `idle_timeout` at `now`. Check and update happen under one lock, so a
    /// concurrent heartbeat is never overwritten.
    pub(crate) fn idle_if_silent(&self, now: Instant, idle_timeout: Duration) -> bool {
        let mut inner = self.inner.lock();
        let silent = now.saturating_duration_since(inner.last_heartbeat);
        if inner.status == SessionStatus::Active && silent > idle_timeout {
            inner.status = SessionStatus::Idle;
            true
        } else {
            false
        }
    }

    /// Mark the session dead and return its previous status.
    pub(crate) fn mark_dead(&self) -> SessionStatus {
        let mut inner = self.inner.lock();
        std::mem::replace(&mut inner.status, SessionStatus::Dead)
    }

    pub fn database(&self) -> Arc<dyn Database> {
        Arc::clone(&self.inner.lock().database)
    }

    /// Rebind the session. Transactions already open keep the engine
    /// transaction they began with.
    pub fn set_database(&self, database: Arc<dyn Database>) {
        self.inner.lock().database = database;
    }

    pub fn last_activity(&self) -> Instant {
        self.inner.lock().last_activity
    }

    pub fn last_heartbeat(&self) -> Instant {
        self.inner.lock().last_heartbeat
    }

    /// Time since the last heartbeat, as seen at `now`.
    pub fn silent_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_heartbeat())
    }

    pub fn read_write_ongoing(&self) -> bool {
        self.inner.lock().read_write_ongoing
    }

    pub fn transaction_count(&self) -> usize {
        self.inner.lock().transactions.len()
    }

    pub fn transaction_ids(&self) -> Vec<String> {
        self.inner.lock().transactions.keys().cloned().collect()
    }

    /// Record a heartbeat. Brings an idle session back to active.
    pub fn heartbeat(&self) {
        let now = clock::now();
        let mut inner = self.inner.lock();
        inner.last_heartbeat = now;
        inner.last_activity = now;
        if inner.status == SessionStatus::Idle {
            inner.status = SessionStatus::Active;
        }
    }

    fn touch(&self) {
        self.inner.lock().last_activity = clock::now();
    }

    // -----------------------------------------------------------------------
    // Transaction manager
    // -----------------------------------------------------------------------

    pub fn new_transaction(&self, mode: TxMode) -> Result<Arc<Transaction>, SessionError> {
        let database = {
            let mut inner = self.inner.lock();
            if inner.status == SessionStatus::Dead {
                return Err(SessionError::SessionNotFound);
            }
            if mode.is_read_write() {
                if inner.read_write_ongoing || inner.read_write_pending {
                    return Err(SessionError::OngoingReadWriteTx);
                }
                inner.read_write_pending = true;
            }
            Arc::clone(&inner.database)
        };

        let begun = database.begin(mode);

        let mut inner = self.inner.lock();
        if mode.is_read_write() {
            inner.read_write_pending = false;
        }
        let engine = begun?;

        if inner.status == SessionStatus::Dead {
            drop(inner);
            if let Err(e) = engine.rollback() {
                warn!(session_id = %self.id, error = %e, "rollback of late engine transaction failed");
            }
            return Err(SessionError::SessionNotFound);
        }

        let mut id = new_transaction_id();
        while inner.transactions.contains_key(&id) {
            id = new_transaction_id();
        }
        let tx = Arc::new(Transaction::new(id.clone(), mode, self.id.clone(), engine));
        inner.transactions.insert(id, Arc::clone(&tx));
        if mode.is_read_write() {
            inner.read_write_ongoing = true;
        }
        inner.last_activity = clock::now();

        debug!(
            session_id = %self.id,
            transaction_id = %tx.id(),
            %mode,
            open = inner.transactions.len(),
            "transaction opened"
        );
        Ok(tx)
    }

    pub fn get_transaction(&self, id: &str) -> Result<Arc<Transaction>, SessionError> {
        self.inner
            .lock()
            .transactions
            .get(id)
            .cloned()
            .ok_or(SessionError::TransactionNotFound)
    }

    /// Drop a transaction from the map without touching its engine state.
    pub fn remove_transaction(&self, id: &str) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        let tx = inner
            .transactions
            .remove(id)
            .ok_or(SessionError::TransactionNotFound)?;
        if tx.mode().is_read_write() {
            inner.read_write_ongoing = false;
        }
        debug!(session_id = %self.id, transaction_id = %id, "transaction removed");
        Ok(())
    }

    /// Execute one operation inside transaction `id`.
    pub fn exec(&self, id: &str, op: Operation) -> Result<ExecOutcome, SessionError> {
        let tx = self.get_transaction(id)?;
        let outcome = tx.exec(op)?;
        self.touch();
        Ok(outcome)
    }

    pub fn commit_transaction(&self, id: &str) -> Result<Option<TxHeader>, SessionError> {
        let tx = self.get_transaction(id)?;
        let outcome = tx.commit();
        self.finish(&tx, outcome)
    }

    pub fn rollback_transaction(&self, id: &str) -> Result<(), SessionError> {
        let tx = self.get_transaction(id)?;
        let outcome = tx.rollback();
        self.finish(&tx, outcome)
    }

    /// A terminal transaction leaves the live set, whoever ended it.
    fn finish<T>(
        &self,
        tx: &Transaction,
        outcome: Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        if tx.is_terminal() {
            // A concurrent teardown may already have drained it.
            let _ = self.remove_transaction(tx.id());
        }
        self.touch();
        outcome
    }

    /// Roll back every open transaction.
    ///
    /// The map is drained under the lock and the rollbacks run after it is
    /// released. Every transaction is attempted; the map is empty when
    /// this returns, whatever the outcome.
    pub fn rollback_all(&self) -> Result<(), RollbackFailures> {
        let drained: Vec<Arc<Transaction>> = {
            let mut inner = self.inner.lock();
            inner.read_write_ongoing = false;
            inner.transactions.drain().map(|(_, tx)| tx).collect()
        };

        let mut failures = RollbackFailures::new();
        for tx in drained {
            debug!(session_id = %self.id, transaction_id = %tx.id(), "rolling back transaction");
            match tx.rollback() {
                // Already committed or rolled back by its owner.
                Ok(()) | Err(SessionError::TransactionNotFound) => {}
                Err(SessionError::Engine(e)) => {
                    error!(
                        session_id = %self.id,
                        transaction_id = %tx.id(),
                        error = %e,
                        "error while rolling back transaction"
                    );
                    failures.push(tx.id(), e);
                }
                Err(other) => {
                    error!(
                        session_id = %self.id,
                        transaction_id = %tx.id(),
                        error = %other,
                        "error while rolling back transaction"
                    );
                    failures.push(tx.id(), EngineError::Other(other.to_string()));
                }
            }
        }
        failures.into_result()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user", &self.user.name)
            .field("status", &inner.status)
            .field("database", &inner.database.name())
            .field("read_write_ongoing", &inner.read_write_ongoing)
            .field("transactions", &inner.transactions.len())
            .finish()
    }
}

/// 160 random bits from the OS, hex encoded.
fn new_transaction_id() -> String {
    let mut bytes = [0u8; TX_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
