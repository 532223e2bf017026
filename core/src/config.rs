//! # Configuration & Constants
//!
//! Protocol constants and the tunables of the session layer. Anything that
//! would otherwise be a magic number somewhere else lives here.
//!
//! [`SessionConfig`] is the only runtime-configurable piece of the core.
//! It deserializes from TOML with durations given in whole seconds:
//!
//! ```toml
//! [session]
//! idle_timeout = 60
//! dead_timeout = 120
//! eviction_interval = 5
//! max_sessions = 1024
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Cryptographic Parameters
// ---------------------------------------------------------------------------

/// Digest length of SHA-256, used for entries, headers and the accumulator.
/// Signature and key lengths come from `ed25519_dalek`.
pub const HASH_LENGTH: usize = 32;

// ---------------------------------------------------------------------------
// Sessions & Transactions
// ---------------------------------------------------------------------------

/// Random bytes in a transaction id. 160 bits, rendered as 40 hex chars.
pub const TX_ID_BYTES: usize = 20;

/// Request metadata key carrying the session id.
pub const SESSION_ID_HEADER: &str = "sessionid";

/// Request metadata key carrying the transaction id.
pub const TRANSACTION_ID_HEADER: &str = "transactionid";

/// A session with no heartbeat for this long becomes idle.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// A session with no heartbeat for this long is force-closed.
pub const DEFAULT_DEAD_TIMEOUT: Duration = Duration::from_secs(120);

/// How often the eviction task scans the session map.
pub const DEFAULT_EVICTION_INTERVAL: Duration = Duration::from_secs(5);

/// Upper bound on concurrently open sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 1024;

/// Database every new session is bound to unless told otherwise.
pub const DEFAULT_DATABASE: &str = "defaultdb";

// ---------------------------------------------------------------------------
// Session configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("dead_timeout ({dead:?}) must be greater than idle_timeout ({idle:?})")]
    DeadBeforeIdle { idle: Duration, dead: Duration },

    #[error("{0} must be non-zero")]
    Zero(&'static str),
}

/// Eviction thresholds and capacity of the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub dead_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub eviction_interval: Duration,
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            dead_timeout: DEFAULT_DEAD_TIMEOUT,
            eviction_interval: DEFAULT_EVICTION_INTERVAL,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::Zero("idle_timeout"));
        }
        if self.eviction_interval.is_zero() {
            return Err(ConfigError::Zero("eviction_interval"));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::Zero("max_sessions"));
        }
        if self.dead_timeout <= self.idle_timeout {
            return Err(ConfigError::DeadBeforeIdle {
                idle: self.idle_timeout,
                dead: self.dead_timeout,
            });
        }
        Ok(())
    }
}

/// Serde adapter for `Duration` as whole seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    #[test]
    fn hash_length_matches_digest_and_state_encoding() {
        assert_eq!(<Sha256 as Digest>::output_size(), HASH_LENGTH);
        assert_eq!(crate::state::CANONICAL_STATE_LEN, 8 + HASH_LENGTH);
        assert_eq!(crate::crypto::sha256(b"x").len(), HASH_LENGTH);
    }

    #[test]
    fn defaults_are_valid() {
        assert!(SessionConfig::default().validate().is_ok());
        assert!(DEFAULT_DEAD_TIMEOUT > DEFAULT_IDLE_TIMEOUT);
        assert!(DEFAULT_EVICTION_INTERVAL < DEFAULT_IDLE_TIMEOUT);
    }

    #[test]
    fn dead_must_follow_idle() {
        let config = SessionConfig {
            idle_timeout: Duration::from_secs(30),
            dead_timeout: Duration::from_secs(30),
            ..SessionConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DeadBeforeIdle { .. })
        ));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = SessionConfig {
            max_sessions: 0,
            ..SessionConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("max_sessions")));
    }

    #[test]
    fn durations_round_trip_as_seconds() {
        let json = serde_json::to_value(SessionConfig::default()).unwrap();
        assert_eq!(json["idle_timeout"], 60);
        assert_eq!(json["dead_timeout"], 120);

        let partial: SessionConfig = serde_json::from_str(r#"{"idle_timeout": 10}"#).unwrap();
        assert_eq!(partial.idle_timeout, Duration::from_secs(10));
        assert_eq!(partial.dead_timeout, DEFAULT_DEAD_TIMEOUT);
    }

    #[test]
    fn header_names_are_lowercase() {
        assert_eq!(SESSION_ID_HEADER, SESSION_ID_HEADER.to_ascii_lowercase());
        assert_eq!(TRANSACTION_ID_HEADER, TRANSACTION_ID_HEADER.to_ascii_lowercase());
        assert_eq!(TX_ID_BYTES * 8, 160);
    }
}
