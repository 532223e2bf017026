//! Request metadata: the headers that carry session and transaction ids.
//!
//! Keys are case-insensitive and may repeat. Only the first value of a
//! key is ever consulted.

use std::collections::HashMap;

use super::SessionError;
use crate::config::{SESSION_ID_HEADER, TRANSACTION_ID_HEADER};

/// Case-insensitive string multimap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    entries: HashMap<String, Vec<String>>,
}

impl RequestMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `value` under `key`.
    pub fn insert(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.entries
            .entry(key.as_ref().to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    pub fn with(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// All values under `key`, in insertion order.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.entries
            .get(&key.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.get_all(key).first().map(String::as_str)
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for RequestMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut md = RequestMetadata::new();
        for (k, v) in iter {
            md.insert(k, v);
        }
        md
    }
}

/// Session id carried by `md`.
///
/// Absent header: [`SessionError::NoSessionAuthData`]. Present but empty:
/// [`SessionError::NoSessionId`].
pub fn session_id_from_metadata(md: &RequestMetadata) -> Result<String, SessionError> {
    match md.get(SESSION_ID_HEADER) {
        None => Err(SessionError::NoSessionAuthData),
        Some("") => Err(SessionError::NoSessionId),
        Some(id) => Ok(id.to_string()),
    }
}

/// Transaction id carried by `md`.
///
/// Absent header: [`SessionError::NoTransactionAuthData`]. Present but
/// empty: [`SessionError::NoTransactionId`].
pub fn transaction_id_from_metadata(md: &RequestMetadata) -> Result<String, SessionError> {
    match md.get(TRANSACTION_ID_HEADER) {
        None => Err(SessionError::NoTransactionAuthData),
        Some("") => Err(SessionError::NoTransactionId),
        Some(id) => Ok(id.to_string()),
    }
}
