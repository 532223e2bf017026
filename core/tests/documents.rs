//! Document collection scenarios: insert, search, prove, verify.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use veritas_core::document::{verify_document, DocumentStore, FieldQuery, IndexType};
use veritas_core::engine::MemoryDatabase;
use veritas_core::ledger::ProofSource;
use veritas_core::state::StateSigner;

fn obj(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
}

fn store() -> DocumentStore {
    DocumentStore::new(Arc::new(MemoryDatabase::new("doc_test_db")))
}

#[test]
fn insert_search_prove_and_verify() {
    let s = store();
    let info = s
        .create_collection(
            "mycollection",
            BTreeMap::from([("pincode".to_string(), IndexType::Integer)]),
        )
        .unwrap();
    assert_eq!(info.index_keys.len(), 2);
    assert!(info.index_keys.contains_key("_id"));
    assert_eq!(info.index_keys["pincode"], IndexType::Integer);

    let inserted = s
        .insert_document("mycollection", obj(json!({ "pincode": 123 })))
        .unwrap();

    let docs = s
        .search_documents("mycollection", &[FieldQuery::eq("pincode", 123)], 1, 10)
        .unwrap();
    assert_eq!(docs.len(), 1);
    let doc = &docs[0];
    assert_eq!(doc["pincode"].as_f64(), Some(123.0));

    let proof = s
        .document_proof("mycollection", &inserted.document_id, None)
        .unwrap();
    let state = verify_document(&proof, doc, None, None).unwrap();
    assert_eq!(state.tx_id, inserted.tx_header.id);
    assert_eq!(state.tx_id, proof.verifiable.dual_proof.target_tx_header.id);
}

#[test]
fn proof_from_earlier_state_and_signed_target() {
    let s = store();
    s.create_collection("c", BTreeMap::new()).unwrap();
    let first = s.insert_document("c", obj(json!({ "n": 1 }))).unwrap();
    let trusted = s.database().current_state();

    for n in 2..=5 {
        s.insert_document("c", obj(json!({ "n": n }))).unwrap();
    }

    let signer = StateSigner::generate();
    let mut proof = s
        .document_proof("c", &first.document_id, Some(trusted.tx_id))
        .unwrap();
    proof.verifiable = signer.sign_entry_proof(proof.verifiable);

    let doc = s.get_document("c", &first.document_id).unwrap();
    let state = verify_document(&proof, &doc, Some(&trusted), Some(&signer.public_key())).unwrap();
    assert_eq!(state.tx_id, s.database().current_state().tx_id);
    assert!(state.tx_id > trusted.tx_id);
}

#[test]
fn document_without_its_id_does_not_verify() {
    let s = store();
    s.create_collection("c", BTreeMap::new()).unwrap();
    let inserted = s.insert_document("c", obj(json!({ "name": "x" }))).unwrap();
    let proof = s.document_proof("c", &inserted.document_id, None).unwrap();

    // The stored document carries `_id`; the caller's original input did not.
    assert!(verify_document(&proof, &obj(json!({ "name": "x" })), None, None).is_err());
}
