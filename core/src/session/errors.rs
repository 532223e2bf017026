//! Errors raised by the session and transaction managers.

use std::fmt;

use thiserror::Error;

use crate::engine::EngineError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no session auth data provided")]
    NoSessionAuthData,

    #[error("no session id present")]
    NoSessionId,

    #[error("no transaction auth data provided")]
    NoTransactionAuthData,

    #[error("no transaction id present")]
    NoTransactionId,

    #[error("session already has an ongoing read-write transaction")]
    OngoingReadWriteTx,

    #[error("transaction not found")]
    TransactionNotFound,

    #[error("session not found")]
    SessionNotFound,

    #[error("session capacity exhausted ({max} sessions open)")]
    CapacityExhausted { max: usize },

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("session teardown incomplete: {0}")]
    Teardown(RollbackFailures),
}

impl SessionError {
    /// Malformed request metadata, as opposed to a state conflict.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SessionError::NoSessionAuthData
                | SessionError::NoSessionId
                | SessionError::NoTransactionAuthData
                | SessionError::NoTransactionId
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SessionError::SessionNotFound | SessionError::TransactionNotFound
        )
    }
}

/// Every rollback that failed during a teardown, keyed by transaction id.
///
/// Teardown never stops at the first failure; all transactions are
/// attempted and all failures reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackFailures {
    failures: Vec<(String, EngineError)>,
}

impl RollbackFailures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, transaction_id: impl Into<String>, error: EngineError) {
        self.failures.push((transaction_id.into(), error));
    }

    pub fn has_errors(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EngineError)> {
        self.failures.iter().map(|(id, e)| (id.as_str(), e))
    }

    /// `Ok(())` when nothing failed.
    pub fn into_result(self) -> Result<(), RollbackFailures> {
        if self.has_errors() {
            Err(self)
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for RollbackFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rollback(s) failed", self.failures.len())?;
        for (i, (id, error)) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{id}: {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RollbackFailures {}
