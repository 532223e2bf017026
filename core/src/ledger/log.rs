//! In-memory transaction log.
//!
//! Every commit appends one [`TxHeader`] whose leaf goes into the
//! accumulator. The log keeps the entries of each transaction so it can
//! prove a single entry inside its transaction's `entries_root`, and a
//! latest-value index so reads do not scan history.
//!
//! Readers and the single committer share one `RwLock`; proof generation
//! takes the read side and never blocks other readers.

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use super::types::{DualProof, Entry, TxHeader, VerifiableEntry};
use super::{LedgerError, ProofSource};
use crate::crypto::hash::Hash;
use crate::merkle::{root_of, MerkleTree};
use crate::state::ImmutableState;

#[derive(Debug, Default)]
struct LogInner {
    headers: Vec<TxHeader>,
    /// Entries per transaction, same order as `headers`.
    entries: Vec<Vec<Entry>>,
    tree: MerkleTree,
    /// key -> (tx id, position inside that transaction) of the latest write.
    index: HashMap<Vec<u8>, (u64, usize)>,
}

impl LogInner {
    fn header(&self, id: u64) -> Result<&TxHeader, LedgerError> {
        if id == 0 {
            return Err(LedgerError::TxNotFound(0));
        }
        self.headers
            .get((id - 1) as usize)
            .ok_or(LedgerError::TxNotFound(id))
    }

    fn last_id(&self) -> u64 {
        self.headers.len() as u64
    }

    fn dual_proof(&self, leaf_tx: u64, source: u64, target: u64) -> Result<DualProof, LedgerError> {
        if source > target {
            return Err(LedgerError::InvalidRange {
                from: source,
                to: target,
            });
        }
        let source_tx_header = self.header(source)?.clone();
        let target_tx_header = self.header(target)?.clone();
        self.header(leaf_tx)?;

        Ok(DualProof {
            source_tx_header,
            target_tx_header,
            inclusion_proof: self.tree.inclusion_proof(leaf_tx - 1, target)?,
            consistency_proof: self.tree.consistency_proof(source, target)?,
        })
    }
}

/// Append-only log of committed transactions.
#[derive(Debug, Default)]
pub struct TxLog {
    inner: RwLock<LogInner>,
}

impl TxLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transaction and return its header.
    ///
    /// Entries keep their given order; the same key written twice in one
    /// transaction resolves to the later write.
    pub fn commit(&self, entries: Vec<Entry>) -> Result<TxHeader, LedgerError> {
        if entries.is_empty() {
            return Err(LedgerError::EmptyTransaction);
        }
        let leaves: Vec<Hash> = entries.iter().map(Entry::leaf_hash).collect();
        let entries_root = root_of(&leaves);

        let mut inner = self.inner.write();
        let id = inner.last_id() + 1;
        let mut header = TxHeader {
            id,
            timestamp: chrono::Utc::now().timestamp_millis().max(0) as u64,
            entry_count: entries.len() as u32,
            entries_root,
            prev_root: inner.tree.root(),
            root: [0u8; 32],
        };
        inner.tree.push(header.leaf_hash());
        header.root = inner.tree.root();

        for (position, entry) in entries.iter().enumerate() {
            inner.index.insert(entry.key.clone(), (id, position));
        }
        inner.headers.push(header.clone());
        inner.entries.push(entries);

        debug!(
            tx_id = id,
            entries = header.entry_count,
            root = %hex::encode(header.root),
            "transaction appended"
        );
        Ok(header)
    }

    /// Id of the latest committed transaction, 0 when empty.
    pub fn last_tx_id(&self) -> u64 {
        self.inner.read().last_id()
    }

    /// Latest value of `key` and the id of the transaction that wrote it.
    pub fn get(&self, key: &[u8]) -> Result<(Vec<u8>, u64), LedgerError> {
        let inner = self.inner.read();
        let &(tx_id, position) = inner.index.get(key).ok_or(LedgerError::KeyNotFound)?;
        let entry = &inner.entries[(tx_id - 1) as usize][position];
        Ok((entry.value.clone(), tx_id))
    }

    /// Keys currently holding a value that start with `prefix`, sorted.
    pub fn keys_with_prefix(&self, prefix: &[u8]) -> Vec<Vec<u8>> {
        let inner = self.inner.read();
        let mut keys: Vec<Vec<u8>> = inner
            .index
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Entries written by transaction `id`.
    pub fn tx_entries(&self, id: u64) -> Result<Vec<Entry>, LedgerError> {
        let inner = self.inner.read();
        inner.header(id)?;
        Ok(inner.entries[(id - 1) as usize].clone())
    }
}

impl ProofSource for TxLog {
    fn current_state(&self) -> ImmutableState {
        let inner = self.inner.read();
        match inner.headers.last() {
            Some(header) => header.state(),
            None => ImmutableState::genesis(),
        }
    }

    fn tx_header(&self, id: u64) -> Result<TxHeader, LedgerError> {
        self.inner.read().header(id).cloned()
    }

    fn proof_between(&self, source: u64, target: u64) -> Result<DualProof, LedgerError> {
        self.inner.read().dual_proof(source, source, target)
    }

    fn verifiable_entry(
        &self,
        key: &[u8],
        since: Option<u64>,
    ) -> Result<VerifiableEntry, LedgerError> {
        let inner = self.inner.read();
        let &(entry_tx, position) = inner.index.get(key).ok_or(LedgerError::KeyNotFound)?;
        let target = inner.last_id();
        let source = since.unwrap_or(target);

        let tx_entries = &inner.entries[(entry_tx - 1) as usize];
        let mut entries_tree = MerkleTree::new();
        for entry in tx_entries {
            entries_tree.push(entry.leaf_hash());
        }
        let entry_proof = entries_tree.inclusion_proof(position as u64, entries_tree.len())?;

        Ok(VerifiableEntry {
            entry: tx_entries[position].clone(),
            entry_tx_header: inner.header(entry_tx)?.clone(),
            entry_proof,
            dual_proof: inner.dual_proof(entry_tx, source, target)?,
            target_signature: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::empty_root;

    fn log_with(n: u64) -> TxLog {
        let log = TxLog::new();
        for i in 1..=n {
            log.commit(vec![Entry::new(format!("k{i}"), format!("v{i}"))])
                .unwrap();
        }
        log
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let log = TxLog::new();
        assert_eq!(log.last_tx_id(), 0);
        let a = log.commit(vec![Entry::new("a", "1")]).unwrap();
        let b = log.commit(vec![Entry::new("b", "2")]).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(log.last_tx_id(), 2);
    }

    #[test]
    fn headers_chain_roots() {
        let log = log_with(3);
        let h1 = log.tx_header(1).unwrap();
        let h2 = log.tx_header(2).unwrap();
        let h3 = log.tx_header(3).unwrap();
        assert_eq!(h1.prev_root, empty_root());
        assert_eq!(h2.prev_root, h1.root);
        assert_eq!(h3.prev_root, h2.root);
        assert_eq!(log.current_state().root_hash, h3.root);
    }

    #[test]
    fn header_roots_match_a_rebuilt_accumulator() {
        let log = log_with(40);
        let mut leaves = Vec::new();
        for id in 1..=40 {
            let header = log.tx_header(id).unwrap();
            assert_eq!(header.prev_root, root_of(&leaves));
            leaves.push(header.leaf_hash());
            assert_eq!(header.root, root_of(&leaves));
        }
    }

    #[test]
    fn empty_commit_is_rejected() {
        assert_eq!(
            TxLog::new().commit(vec![]),
            Err(LedgerError::EmptyTransaction)
        );
    }

    #[test]
    fn latest_write_wins() {
        let log = TxLog::new();
        log.commit(vec![Entry::new("k", "old")]).unwrap();
        log.commit(vec![Entry::new("x", "y"), Entry::new("k", "new")])
            .unwrap();
        assert_eq!(log.get(b"k").unwrap(), (b"new".to_vec(), 2));
        assert_eq!(log.get(b"missing"), Err(LedgerError::KeyNotFound));
    }

    #[test]
    fn unknown_headers() {
        let log = log_with(2);
        assert_eq!(log.tx_header(0), Err(LedgerError::TxNotFound(0)));
        assert_eq!(log.tx_header(3), Err(LedgerError::TxNotFound(3)));
    }

    #[test]
    fn proof_between_links_source_to_target() {
        let log = log_with(7);
        let proof = log.proof_between(3, 7).unwrap();
        let source = &proof.source_tx_header;
        let target = &proof.target_tx_header;
        assert!(proof
            .inclusion_proof
            .verify(&source.leaf_hash(), &target.root));
        assert!(proof.consistency_proof.verify(&source.root, &target.root));
    }

    #[test]
    fn proof_between_rejects_inverted_range() {
        let log = log_with(4);
        assert_eq!(
            log.proof_between(4, 2),
            Err(LedgerError::InvalidRange { from: 4, to: 2 })
        );
    }

    #[test]
    fn verifiable_entry_chains_to_target_root() {
        let log = log_with(5);
        log.commit(vec![
            Entry::new("a", "1"),
            Entry::new("b", "2"),
            Entry::new("c", "3"),
        ])
        .unwrap();
        log.commit(vec![Entry::new("z", "26")]).unwrap();

        let proof = log.verifiable_entry(b"b", Some(2)).unwrap();
        assert_eq!(proof.entry, Entry::new("b", "2"));
        assert_eq!(proof.entry_tx_header.id, 6);
        assert!(proof
            .entry_proof
            .verify(&proof.entry.leaf_hash(), &proof.entry_tx_header.entries_root));

        let dual = &proof.dual_proof;
        assert_eq!(dual.source_tx_header.id, 2);
        assert_eq!(dual.target_tx_header.id, 7);
        assert!(dual
            .inclusion_proof
            .verify(&proof.entry_tx_header.leaf_hash(), &dual.target_tx_header.root));
        assert!(dual
            .consistency_proof
            .verify(&dual.source_tx_header.root, &dual.target_tx_header.root));
    }

    #[test]
    fn verifiable_entry_since_future_is_invalid() {
        let log = log_with(3);
        assert_eq!(
            log.verifiable_entry(b"k1", Some(9)),
            Err(LedgerError::InvalidRange { from: 9, to: 3 })
        );
        assert_eq!(
            log.verifiable_entry(b"k1", Some(0)),
            Err(LedgerError::TxNotFound(0))
        );
    }

    #[test]
    fn prefix_scan_is_sorted() {
        let log = TxLog::new();
        log.commit(vec![
            Entry::new("doc/b", "1"),
            Entry::new("doc/a", "2"),
            Entry::new("other", "3"),
        ])
        .unwrap();
        assert_eq!(
            log.keys_with_prefix(b"doc/"),
            vec![b"doc/a".to_vec(), b"doc/b".to_vec()]
        );
    }
}
