//! Session and transaction manager scenarios.
//!
//! These run the manager against the in-memory engine and against small
//! fake engines that fail or stall on purpose, to pin down the teardown and
//! read-write exclusivity guarantees.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use tokio::sync::watch;

use veritas_core::engine::{
    Database, EngineError, EngineTx, ExecOutcome, MemoryDatabase, Operation, TxMode,
};
use veritas_core::ledger::TxHeader;
use veritas_core::session::{
    session_id_from_metadata, transaction_id_from_metadata, RequestMetadata, SessionError,
    SessionManager, SessionStatus, User,
};
use veritas_core::SessionConfig;

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn manager() -> SessionManager {
    SessionManager::new(SessionConfig::default())
}

fn memory_db() -> Arc<dyn Database> {
    Arc::new(MemoryDatabase::new("defaultdb"))
}

fn set(key: &str, value: &str) -> Operation {
    Operation::Set {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
    }
}

/// Engine whose first `failing` transactions refuse to roll back.
struct FlakyDatabase {
    begun: AtomicUsize,
    failing: usize,
}

impl FlakyDatabase {
    fn new(failing: usize) -> Self {
        Self {
            begun: AtomicUsize::new(0),
            failing,
        }
    }
}

struct FlakyTx {
    mode: TxMode,
    fail_rollback: bool,
}

impl Database for FlakyDatabase {
    fn name(&self) -> &str {
        "flaky"
    }

    fn begin(&self, mode: TxMode) -> Result<Box<dyn EngineTx>, EngineError> {
        let n = self.begun.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FlakyTx {
            mode,
            fail_rollback: n < self.failing,
        }))
    }
}

impl EngineTx for FlakyTx {
    fn mode(&self) -> TxMode {
        self.mode
    }

    fn exec(&mut self, _op: Operation) -> Result<ExecOutcome, EngineError> {
        Ok(ExecOutcome::Written)
    }

    fn commit(self: Box<Self>) -> Result<Option<TxHeader>, EngineError> {
        Ok(None)
    }

    fn rollback(self: Box<Self>) -> Result<(), EngineError> {
        if self.fail_rollback {
            Err(EngineError::Other("rollback refused".into()))
        } else {
            Ok(())
        }
    }
}

/// Engine whose `begin` takes a while, to widen the window between the
/// conflict check and registration.
struct SlowDatabase {
    inner: MemoryDatabase,
    begun: AtomicUsize,
}

impl Database for SlowDatabase {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn begin(&self, mode: TxMode) -> Result<Box<dyn EngineTx>, EngineError> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        self.inner.begin(mode)
    }
}

// ---------------------------------------------------------------------------
// 1. Read-write exclusivity
// ---------------------------------------------------------------------------

#[test]
fn read_write_conflict_then_commit_then_reopen() {
    let m = manager();
    let s = m.create_session(User::new("immudb"), memory_db()).unwrap();

    let tx1 = s.new_transaction(TxMode::ReadWrite).unwrap();
    assert!(matches!(
        s.new_transaction(TxMode::ReadWrite),
        Err(SessionError::OngoingReadWriteTx)
    ));

    s.exec(tx1.id(), set("k", "v")).unwrap();
    let header = s.commit_transaction(tx1.id()).unwrap().unwrap();
    assert_eq!(header.id, 1);
    assert!(!s.read_write_ongoing());

    let tx3 = s.new_transaction(TxMode::ReadWrite).unwrap();
    assert_ne!(tx3.id(), tx1.id());
    assert_eq!(
        s.exec(tx3.id(), Operation::Get { key: b"k".to_vec() }).unwrap(),
        ExecOutcome::Value(b"v".to_vec())
    );
}

#[test]
fn concurrent_read_write_opens_admit_exactly_one() {
    let m = manager();
    let db = Arc::new(SlowDatabase {
        inner: MemoryDatabase::new("defaultdb"),
        begun: AtomicUsize::new(0),
    });
    let s = m.create_session(User::new("immudb"), db.clone()).unwrap();

    let threads = 16;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let s = Arc::clone(&s);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                s.new_transaction(TxMode::ReadWrite).map(|tx| tx.id().to_string())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let winners = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(SessionError::OngoingReadWriteTx)))
        .count();

    assert_eq!(winners, 1);
    assert_eq!(conflicts, threads - 1);
    assert_eq!(s.transaction_count(), 1);
    // Rejected callers never reached the engine.
    assert_eq!(db.begun.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// 2. Teardown
// ---------------------------------------------------------------------------

#[test]
fn rollback_all_reports_every_failure() {
    let m = manager();
    let s = m
        .create_session(User::new("immudb"), Arc::new(FlakyDatabase::new(2)))
        .unwrap();

    s.new_transaction(TxMode::ReadWrite).unwrap();
    for _ in 0..4 {
        s.new_transaction(TxMode::ReadOnly).unwrap();
    }
    assert_eq!(s.transaction_count(), 5);

    let failures = s.rollback_all().unwrap_err();
    assert_eq!(failures.len(), 2);
    assert!(failures
        .iter()
        .all(|(_, e)| *e == EngineError::Other("rollback refused".into())));
    assert_eq!(s.transaction_count(), 0);
    assert!(!s.read_write_ongoing());
}

#[test]
fn close_session_removes_even_when_rollbacks_fail() {
    let m = manager();
    let s = m
        .create_session(User::new("immudb"), Arc::new(FlakyDatabase::new(1)))
        .unwrap();
    let id = s.id().to_string();
    s.new_transaction(TxMode::ReadOnly).unwrap();
    s.new_transaction(TxMode::ReadOnly).unwrap();

    match m.close_session(&id) {
        Err(SessionError::Teardown(failures)) => assert_eq!(failures.len(), 1),
        other => panic!("expected teardown failure, got {other:?}"),
    }
    assert_eq!(m.count(), 0);
    assert_eq!(s.status(), SessionStatus::Dead);
    assert!(matches!(
        m.get_session(&id),
        Err(SessionError::SessionNotFound)
    ));
}

#[test]
fn ended_transactions_leave_the_live_set() {
    let m = manager();
    let s = m.create_session(User::new("immudb"), memory_db()).unwrap();
    let tx = s.new_transaction(TxMode::ReadWrite).unwrap();
    s.exec(tx.id(), set("a", "1")).unwrap();
    s.commit_transaction(tx.id()).unwrap();

    assert!(tx.is_terminal());
    assert_eq!(s.transaction_count(), 0);
    assert!(!s.read_write_ongoing());
    assert!(matches!(
        s.commit_transaction(tx.id()),
        Err(SessionError::TransactionNotFound)
    ));

    let ro = s.new_transaction(TxMode::ReadOnly).unwrap();
    s.rollback_transaction(ro.id()).unwrap();
    assert!(matches!(
        s.rollback_transaction(ro.id()),
        Err(SessionError::TransactionNotFound)
    ));

    assert!(s.new_transaction(TxMode::ReadWrite).is_ok());
    m.close_session(s.id()).unwrap();
}

// ---------------------------------------------------------------------------
// 3. Request metadata
// ---------------------------------------------------------------------------

#[test]
fn unknown_transaction_id_is_not_found() {
    let m = manager();
    let s = m.create_session(User::new("immudb"), memory_db()).unwrap();
    s.new_transaction(TxMode::ReadOnly).unwrap();

    let md = RequestMetadata::new()
        .with("sessionid", s.id())
        .with("transactionid", "0000000000000000000000000000000000000000");

    let session = m.get_session(&session_id_from_metadata(&md).unwrap()).unwrap();
    let tx_id = transaction_id_from_metadata(&md).unwrap();
    assert!(matches!(
        session.get_transaction(&tx_id),
        Err(SessionError::TransactionNotFound)
    ));
    assert!(matches!(
        session.commit_transaction(&tx_id),
        Err(SessionError::TransactionNotFound)
    ));
}

#[test]
fn metadata_errors_are_distinguished() {
    let absent = RequestMetadata::new();
    let empty = RequestMetadata::new().with("sessionid", "");
    assert!(matches!(
        session_id_from_metadata(&absent),
        Err(SessionError::NoSessionAuthData)
    ));
    assert!(matches!(
        session_id_from_metadata(&empty),
        Err(SessionError::NoSessionId)
    ));
}

// ---------------------------------------------------------------------------
// 4. Eviction
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn eviction_task_idles_then_closes_silent_sessions() {
    let m = Arc::new(SessionManager::new(SessionConfig {
        idle_timeout: Duration::from_secs(2),
        dead_timeout: Duration::from_secs(4),
        eviction_interval: Duration::from_secs(1),
        ..SessionConfig::default()
    }));
    let silent = m.create_session(User::new("a"), memory_db()).unwrap();
    let chatty = m.create_session(User::new("b"), memory_db()).unwrap();
    silent.new_transaction(TxMode::ReadWrite).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = Arc::clone(&m).spawn_eviction(shutdown_rx);

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(silent.status(), SessionStatus::Idle);
    m.update_heartbeat(chatty.id()).unwrap();
    assert_eq!(chatty.status(), SessionStatus::Active);

    tokio::time::sleep(Duration::from_secs(2)).await;
    m.update_heartbeat(chatty.id()).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(silent.status(), SessionStatus::Dead);
    assert_eq!(silent.transaction_count(), 0);
    assert_eq!(m.session_ids(), vec![chatty.id().to_string()]);
    assert_eq!(m.evicted_total(), 1);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}
