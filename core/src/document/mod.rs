//! # Document Collections
//!
//! A thin JSON document layer on top of the key/value engine, and the
//! main consumer of the verification engine.
//!
//! ## Layout in the log
//!
//! ```text
//! collection/{name}        → collection info (JSON)
//! doc/{collection}/{id}    → document (canonical JSON, `_id` included)
//! ```
//!
//! Documents are serialized with sorted keys, so the same document always
//! produces the same entry and a client can re-derive the entry it is
//! verifying from the document alone. Each insert commits in its own
//! read-write engine transaction.

pub mod query;

use std::collections::BTreeMap;
use std::sync::Arc;

use ed25519_dalek::VerifyingKey;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::engine::{Database, EngineError, MemoryDatabase, Operation, TxMode};
use crate::ledger::{Entry, LedgerError, ProofSource, TxHeader, VerifiableEntry};
use crate::state::ImmutableState;
use crate::verification::{verify_inclusion_and_consistency, VerificationError};

pub use query::{FieldQuery, QueryOperator};

/// Field every document carries its id in.
pub const DOCUMENT_ID_FIELD: &str = "_id";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("collection '{0}' not found")]
    CollectionNotFound(String),

    #[error("collection '{0}' already exists")]
    CollectionExists(String),

    #[error("document '{id}' not found in collection '{collection}'")]
    DocumentNotFound { collection: String, id: String },

    #[error("invalid document: {0}")]
    InvalidDocument(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Verification(#[from] VerificationError),
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    String,
    Integer,
    Double,
    Boolean,
}

impl IndexType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            IndexType::String => value.is_string(),
            IndexType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            IndexType::Double => value.is_number(),
            IndexType::Boolean => value.is_boolean(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    /// Typed fields, `_id` always included.
    pub index_keys: BTreeMap<String, IndexType>,
}

/// Result of a successful insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertedDocument {
    pub document_id: String,
    pub tx_header: TxHeader,
}

/// Proof that a document is part of the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentProof {
    pub collection: String,
    pub document_id: String,
    pub verifiable: VerifiableEntry,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct DocumentStore {
    database: Arc<MemoryDatabase>,
    collections: RwLock<BTreeMap<String, CollectionInfo>>,
}

impl DocumentStore {
    pub fn new(database: Arc<MemoryDatabase>) -> Self {
        Self {
            database,
            collections: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn database(&self) -> &Arc<MemoryDatabase> {
        &self.database
    }

    pub fn create_collection(
        &self,
        name: &str,
        index_keys: BTreeMap<String, IndexType>,
    ) -> Result<CollectionInfo, DocumentError> {
        if name.is_empty() || name.contains('/') {
            return Err(DocumentError::InvalidDocument(format!(
                "invalid collection name '{name}'"
            )));
        }
        if index_keys.contains_key(DOCUMENT_ID_FIELD) {
            return Err(DocumentError::InvalidDocument(format!(
                "{DOCUMENT_ID_FIELD} is indexed implicitly"
            )));
        }

        let mut collections = self.collections.write();
        if collections.contains_key(name) {
            return Err(DocumentError::CollectionExists(name.to_string()));
        }
        let mut info = CollectionInfo {
            name: name.to_string(),
            index_keys,
        };
        info.index_keys
            .insert(DOCUMENT_ID_FIELD.to_string(), IndexType::String);

        self.write(collection_key(name), serde_json::to_vec(&info)?)?;
        collections.insert(name.to_string(), info.clone());
        debug!(collection = %name, indexes = info.index_keys.len(), "collection created");
        Ok(info)
    }

    pub fn get_collection(&self, name: &str) -> Result<CollectionInfo, DocumentError> {
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DocumentError::CollectionNotFound(name.to_string()))
    }

    /// Collection names, sorted.
    pub fn collections(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    /// Insert `document`, assigning it a fresh `_id`.
    pub fn insert_document(
        &self,
        collection: &str,
        mut document: Map<String, Value>,
    ) -> Result<InsertedDocument, DocumentError> {
        let info = self.get_collection(collection)?;
        if document.contains_key(DOCUMENT_ID_FIELD) {
            return Err(DocumentError::InvalidDocument(format!(
                "{DOCUMENT_ID_FIELD} is assigned by the store"
            )));
        }
        for (field, index_type) in &info.index_keys {
            if let Some(value) = document.get(field) {
                if !index_type.accepts(value) {
                    return Err(DocumentError::InvalidDocument(format!(
                        "field '{field}' is not of type {index_type:?}"
                    )));
                }
            }
        }

        let document_id = Uuid::new_v4().simple().to_string();
        document.insert(
            DOCUMENT_ID_FIELD.to_string(),
            Value::String(document_id.clone()),
        );
        let tx_header = self.write(
            document_key(collection, &document_id),
            serde_json::to_vec(&document)?,
        )?;
        debug!(collection, document_id = %document_id, tx_id = tx_header.id, "document inserted");
        Ok(InsertedDocument {
            document_id,
            tx_header,
        })
    }

    pub fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Map<String, Value>, DocumentError> {
        self.get_collection(collection)?;
        let key = document_key(collection, id);
        match self.database.log().get(&key) {
            Ok((raw, _)) => Ok(serde_json::from_slice(&raw)?),
            Err(LedgerError::KeyNotFound) => Err(DocumentError::DocumentNotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Documents matching every query, ordered by id. `page` starts at 1.
    pub fn search_documents(
        &self,
        collection: &str,
        queries: &[FieldQuery],
        page: usize,
        per_page: usize,
    ) -> Result<Vec<Map<String, Value>>, DocumentError> {
        if page == 0 || per_page == 0 {
            return Err(DocumentError::InvalidQuery(
                "page and per_page start at 1".into(),
            ));
        }
        let info = self.get_collection(collection)?;
        if let Some(q) = queries
            .iter()
            .find(|q| !info.index_keys.contains_key(&q.field))
        {
            return Err(DocumentError::InvalidQuery(format!(
                "field '{}' is not indexed",
                q.field
            )));
        }

        let log = self.database.log();
        let mut matched = Vec::new();
        for key in log.keys_with_prefix(&document_prefix(collection)) {
            let (raw, _) = log.get(&key)?;
            let document: Map<String, Value> = serde_json::from_slice(&raw)?;
            if queries.iter().all(|q| q.matches(&document)) {
                matched.push(document);
            }
        }
        Ok(matched
            .into_iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .collect())
    }

    /// Proof for the current version of a document, relative to the state
    /// at `since` (or self-contained when `None`).
    pub fn document_proof(
        &self,
        collection: &str,
        id: &str,
        since: Option<u64>,
    ) -> Result<DocumentProof, DocumentError> {
        self.get_collection(collection)?;
        let verifiable = match self
            .database
            .verifiable_entry(&document_key(collection, id), since)
        {
            Ok(v) => v,
            Err(LedgerError::KeyNotFound) => {
                return Err(DocumentError::DocumentNotFound {
                    collection: collection.to_string(),
                    id: id.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        Ok(DocumentProof {
            collection: collection.to_string(),
            document_id: id.to_string(),
            verifiable,
        })
    }

    fn write(&self, key: Vec<u8>, value: Vec<u8>) -> Result<TxHeader, DocumentError> {
        let mut tx = self.database.begin(TxMode::ReadWrite)?;
        if let Err(e) = tx.exec(Operation::Set { key, value }) {
            tx.rollback()?;
            return Err(e.into());
        }
        tx.commit()?
            .ok_or_else(|| DocumentError::Engine(EngineError::Other("empty commit".into())))
    }
}

/// Verify `document` against `proof`. On success returns the new trusted
/// state, whose `tx_id` is the proof's target transaction.
pub fn verify_document(
    proof: &DocumentProof,
    document: &Map<String, Value>,
    prior: Option<&ImmutableState>,
    public_key: Option<&VerifyingKey>,
) -> Result<ImmutableState, DocumentError> {
    let entry = Entry {
        key: document_key(&proof.collection, &proof.document_id),
        value: serde_json::to_vec(document)?,
    };
    Ok(verify_inclusion_and_consistency(
        &entry,
        &proof.verifiable,
        prior,
        public_key,
    )?)
}

fn collection_key(name: &str) -> Vec<u8> {
    format!("collection/{name}").into_bytes()
}

fn document_prefix(collection: &str) -> Vec<u8> {
    format!("doc/{collection}/").into_bytes()
}

fn document_key(collection: &str, id: &str) -> Vec<u8> {
    format!("doc/{collection}/{id}").into_bytes()
}
