//! Registry of live sessions.
//!
//! The manager owns the id → session map behind a `RwLock`. Lookups take
//! the read side; only create, close and eviction write. Each session then
//! has its own mutex (see [`Session`]), so the two levels never nest in
//! the other direction: the manager lock is always released before a
//! session is torn down.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::clock;
use super::errors::SessionError;
use super::session::{Session, SessionStatus, User};
use crate::config::SessionConfig;
use crate::engine::Database;

/// Outcome of one eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Sessions moved from `Active` to `Idle`.
    pub idled: Vec<String>,
    /// Sessions force-closed.
    pub closed: Vec<String>,
}

impl EvictionReport {
    pub fn is_empty(&self) -> bool {
        self.idled.is_empty() && self.closed.is_empty()
    }
}

pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    config: SessionConfig,
    evicted_total: AtomicU64,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            evicted_total: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn create_session(
        &self,
        user: User,
        database: Arc<dyn Database>,
    ) -> Result<Arc<Session>, SessionError> {
        let mut sessions = self.sessions.write();
        if sessions.len() >= self.config.max_sessions {
            warn!(max = self.config.max_sessions, "session capacity exhausted");
            return Err(SessionError::CapacityExhausted {
                max: self.config.max_sessions,
            });
        }
        let id = Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone(), user, database));
        sessions.insert(id, Arc::clone(&session));
        debug!(
            session_id = %session.id(),
            user = %session.user().name,
            database = %session.database().name(),
            "session created"
        );
        Ok(session)
    }

    pub fn get_session(&self, id: &str) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .read()
            .get(id)
            .cloned()
            .ok_or(SessionError::SessionNotFound)
    }

    pub fn update_heartbeat(&self, id: &str) -> Result<(), SessionError> {
        self.get_session(id)?.heartbeat();
        Ok(())
    }

    /// Mark the session dead, roll back everything it holds and forget it.
    ///
    /// The session is removed even when some rollbacks fail; the failures
    /// come back as [`SessionError::Teardown`].
    pub fn close_session(&self, id: &str) -> Result<(), SessionError> {
        let session = self.get_session(id)?;
        if session.mark_dead() == SessionStatus::Dead {
            // Someone else is already tearing it down.
            return Err(SessionError::SessionNotFound);
        }
        self.teardown(&session)
    }

    /// Roll back and forget a session the caller has already marked dead.
    fn teardown(&self, session: &Session) -> Result<(), SessionError> {
        let rolled_back = session.rollback_all();
        self.sessions.write().remove(session.id());
        debug!(session_id = %session.id(), "session closed");
        rolled_back.map_err(SessionError::Teardown)
    }

    /// One eviction pass as of `now`.
    pub fn evict_expired(&self, now: Instant) -> EvictionReport {
        let snapshot: Vec<Arc<Session>> = self.sessions.read().values().cloned().collect();
        let mut report = EvictionReport::default();

        for session in snapshot {
            if session.mark_dead_if_silent(now, self.config.dead_timeout) {
                warn!(
                    session_id = %session.id(),
                    silent_secs = session.silent_for(now).as_secs(),
                    "evicting dead session"
                );
                match self.teardown(&session) {
                    Ok(()) => report.closed.push(session.id().to_string()),
                    Err(SessionError::Teardown(failures)) => {
                        warn!(session_id = %session.id(), %failures, "session evicted with rollback failures");
                        report.closed.push(session.id().to_string());
                    }
                    Err(e) => warn!(session_id = %session.id(), error = %e, "eviction failed"),
                }
            } else if session.idle_if_silent(now, self.config.idle_timeout) {
                debug!(session_id = %session.id(), "session idle");
                report.idled.push(session.id().to_string());
            }
        }

        self.evicted_total
            .fetch_add(report.closed.len() as u64, Ordering::Relaxed);
        report
    }

    /// Run eviction passes every `eviction_interval` until `shutdown`
    /// flips to `true`. `on_pass` sees every report.
    pub async fn run_eviction<F>(self: Arc<Self>, mut shutdown: watch::Receiver<bool>, on_pass: F)
    where
        F: Fn(&EvictionReport) + Send + 'static,
    {
        let mut ticker = tokio::time::interval(self.config.eviction_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.eviction_interval.as_secs(),
            "session eviction starting"
        );

        loop {
            if *shutdown.borrow() {
                info!("session eviction received shutdown signal");
                return;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.evict_expired(clock::now());
                    if !report.is_empty() {
                        info!(
                            idled = report.idled.len(),
                            closed = report.closed.len(),
                            "eviction pass"
                        );
                    }
                    on_pass(&report);
                }
                _ = shutdown.changed() => {
                    info!("session eviction shutting down");
                    return;
                }
            }
        }
    }

    pub fn spawn_eviction(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run_eviction(shutdown, |_| {}))
    }

    /// Close every session. Used on shutdown; failures are logged.
    /// Returns how many sessions were closed.
    pub fn close_all(&self) -> usize {
        let ids = self.session_ids();
        let mut closed = 0;
        for id in ids {
            match self.close_session(&id) {
                Ok(()) => closed += 1,
                Err(SessionError::SessionNotFound) => {}
                Err(e) => {
                    warn!(session_id = %id, error = %e, "session closed with errors");
                    closed += 1;
                }
            }
        }
        info!(closed, "all sessions closed");
        closed
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Sessions force-closed by eviction since startup.
    pub fn evicted_total(&self) -> u64 {
        self.evicted_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryDatabase, TxMode};
    use std::time::Duration;

    fn manager(max_sessions: usize) -> SessionManager {
        SessionManager::new(SessionConfig {
            max_sessions,
            ..SessionConfig::default()
        })
    }

    fn db() -> Arc<dyn Database> {
        Arc::new(MemoryDatabase::new("defaultdb"))
    }

    #[test]
    fn create_and_lookup() {
        let m = manager(4);
        let s = m.create_session(User::new("alice"), db()).unwrap();
        assert_eq!(s.status(), SessionStatus::Active);
        assert_eq!(m.get_session(s.id()).unwrap().id(), s.id());
        assert_eq!(m.count(), 1);
        assert!(matches!(
            m.get_session("nope"),
            Err(SessionError::SessionNotFound)
        ));
    }

    #[test]
    fn capacity_is_enforced() {
        let m = manager(2);
        m.create_session(User::new("a"), db()).unwrap();
        m.create_session(User::new("b"), db()).unwrap();
        assert!(matches!(
            m.create_session(User::new("c"), db()),
            Err(SessionError::CapacityExhausted { max: 2 })
        ));
    }

    #[test]
    fn close_rolls_back_and_removes() {
        let m = manager(4);
        let s = m.create_session(User::new("a"), db()).unwrap();
        s.new_transaction(TxMode::ReadWrite).unwrap();
        s.new_transaction(TxMode::ReadOnly).unwrap();

        m.close_session(s.id()).unwrap();
        assert_eq!(s.status(), SessionStatus::Dead);
        assert_eq!(s.transaction_count(), 0);
        assert_eq!(m.count(), 0);
        assert!(matches!(
            m.close_session(s.id()),
            Err(SessionError::SessionNotFound)
        ));
    }

    #[test]
    fn eviction_idles_then_closes() {
        let m = manager(4);
        let s = m.create_session(User::new("a"), db()).unwrap();
        s.new_transaction(TxMode::ReadWrite).unwrap();
        let start = s.last_heartbeat();

        let report = m.evict_expired(start + Duration::from_secs(10));
        assert!(report.is_empty());

        let report = m.evict_expired(start + Duration::from_secs(61));
        assert_eq!(report.idled, vec![s.id().to_string()]);
        assert_eq!(s.status(), SessionStatus::Idle);

        let report = m.evict_expired(start + Duration::from_secs(121));
        assert_eq!(report.closed, vec![s.id().to_string()]);
        assert_eq!(s.transaction_count(), 0);
        assert_eq!(m.count(), 0);
        assert_eq!(m.evicted_total(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn late_heartbeat_wins_over_dead_timeout() {
        let m = manager(4);
        let s = m.create_session(User::new("a"), db()).unwrap();
        s.new_transaction(TxMode::ReadWrite).unwrap();
        let pass_at = s.last_heartbeat() + Duration::from_secs(121);

        // The heartbeat lands after the pass picked its instant.
        tokio::time::advance(Duration::from_secs(121)).await;
        m.update_heartbeat(s.id()).unwrap();

        let report = m.evict_expired(pass_at);
        assert!(report.closed.is_empty());
        assert_eq!(s.status(), SessionStatus::Active);
        assert_eq!(s.transaction_count(), 1);
        assert_eq!(m.count(), 1);
    }

    #[test]
    fn only_one_caller_marks_a_silent_session_dead() {
        let m = manager(4);
        let s = m.create_session(User::new("a"), db()).unwrap();
        let late = s.last_heartbeat() + Duration::from_secs(121);

        assert!(s.mark_dead_if_silent(late, m.config().dead_timeout));
        assert!(!s.mark_dead_if_silent(late, m.config().dead_timeout));
        assert!(matches!(
            m.close_session(s.id()),
            Err(SessionError::SessionNotFound)
        ));
    }

    #[test]
    fn close_all_empties_registry() {
        let m = manager(8);
        for i in 0..3 {
            let s = m.create_session(User::new(format!("u{i}")), db()).unwrap();
            s.new_transaction(TxMode::ReadOnly).unwrap();
        }
        assert_eq!(m.close_all(), 3);
        assert_eq!(m.count(), 0);
    }
}
