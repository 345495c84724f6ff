//! Backend-independent nonce service contract.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NonceError, NonceResult};

/// A freshly issued nonce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedNonce {
    /// Opaque token handed to the client.
    pub token: String,
    /// Instant after which the token is no longer redeemable.
    pub expires_at: DateTime<Utc>,
}

/// Result of a tidy pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NonceStatus {
    /// Total nonces issued by this instance.
    pub issued: u64,
    /// Nonces that may still be outstanding.
    pub outstanding: u64,
    pub message: String,
}

impl fmt::Display for NonceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "issued={} outstanding={}",
            self.issued, self.outstanding
        )?;
        if !self.message.is_empty() {
            write!(f, " ({})", self.message)?;
        }
        Ok(())
    }
}

/// Issues short-lived tokens and accepts each one at most once.
///
/// Services are shared across threads; every operation completes
/// synchronously and performs no I/O.
pub trait NonceService: Send + Sync {
    /// Issue a new nonce.
    fn get(&self) -> NonceResult<IssuedNonce>;

    /// Redeem `token`. Returns `true` exactly once per issued token within
    /// its validity period. Malformed, forged, expired and replayed tokens
    /// are all rejected with the same `false`.
    fn redeem(&self, token: &str) -> bool;

    /// Reclaim memory held for expired or absorbed nonces and report counts.
    fn tidy(&self) -> NonceStatus;

    /// Whether each nonce is accepted at most once.
    fn is_strict(&self) -> bool;

    /// Whether nonces issued on one node are redeemable on another.
    fn is_cross_node(&self) -> bool;
}

/// Convert a validity period to a signed duration, rejecting zero.
pub(crate) fn validity_delta(validity: std::time::Duration) -> NonceResult<TimeDelta> {
    if validity.is_zero() {
        return Err(NonceError::InvalidValidity {
            message: "validity must be positive".to_string(),
        });
    }
    TimeDelta::from_std(validity).map_err(|e| NonceError::InvalidValidity {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_validity_must_be_positive() {
        assert!(matches!(
            validity_delta(Duration::ZERO),
            Err(NonceError::InvalidValidity { .. })
        ));
        assert!(matches!(
            validity_delta(Duration::MAX),
            Err(NonceError::InvalidValidity { .. })
        ));
        assert_eq!(
            validity_delta(Duration::from_secs(90)).unwrap(),
            TimeDelta::seconds(90)
        );
    }

    #[test]
    fn test_status_display() {
        let status = NonceStatus {
            issued: 10,
            outstanding: 3,
            message: String::new(),
        };
        assert_eq!(status.to_string(), "issued=10 outstanding=3");

        let status = NonceStatus {
            message: "2 buckets".into(),
            ..status
        };
        assert_eq!(status.to_string(), "issued=10 outstanding=3 (2 buckets)");
    }

    #[test]
    fn test_status_serializes() {
        let status = NonceStatus {
            issued: 1,
            outstanding: 0,
            message: "ok".into(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["issued"], 1);
        assert_eq!(json["outstanding"], 0);
        assert_eq!(json["message"], "ok");
    }
}
