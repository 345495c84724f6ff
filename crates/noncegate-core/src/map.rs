//! Map-backed nonce service.
//!
//! Keeps every outstanding token in memory. It carries none of the
//! unforgeability properties of [`EncryptedNonceService`](crate::EncryptedNonceService)
//! and exists as a behavioural baseline for the strict contract.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::entropy::{EntropySource, OsEntropy};
use crate::error::{NonceError, NonceResult};
use crate::service::{validity_delta, IssuedNonce, NonceService, NonceStatus};

/// Random bytes per map token.
pub const MAP_TOKEN_BYTES: usize = 16;

pub struct MapNonceService {
    validity: TimeDelta,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn EntropySource>,
    issued: AtomicU64,
    outstanding: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl fmt::Debug for MapNonceService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapNonceService")
            .field("validity", &self.validity)
            .field("issued", &self.issued.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl MapNonceService {
    pub fn new(validity: Duration) -> NonceResult<Self> {
        Self::with_capabilities(validity, Arc::new(SystemClock), Arc::new(OsEntropy))
    }

    pub fn with_capabilities(
        validity: Duration,
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn EntropySource>,
    ) -> NonceResult<Self> {
        let validity = validity_delta(validity)?;
        debug!(
            validity_secs = validity.num_seconds(),
            "map nonce service initialised"
        );
        Ok(Self {
            validity,
            clock,
            entropy,
            issued: AtomicU64::new(0),
            outstanding: Mutex::new(HashMap::new()),
        })
    }

    /// Number of tokens currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.outstanding
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl NonceService for MapNonceService {
    fn get(&self) -> NonceResult<IssuedNonce> {
        let mut raw = [0u8; MAP_TOKEN_BYTES];
        self.entropy.fill_random(&mut raw)?;
        let token = URL_SAFE_NO_PAD.encode(raw);

        let now = self.clock.now();
        // whole seconds, the same resolution the encrypted backend seals
        let expires_at = now
            .checked_add_signed(self.validity)
            .and_then(|at| DateTime::from_timestamp(at.timestamp(), 0))
            .ok_or(NonceError::ClockOutOfRange {
                timestamp: now.timestamp(),
            })?;

        self.entries().insert(token.clone(), expires_at);
        self.issued.fetch_add(1, Ordering::AcqRel);

        Ok(IssuedNonce { token, expires_at })
    }

    fn redeem(&self, token: &str) -> bool {
        let now = self.clock.now();
        let mut entries = self.entries();
        match entries.remove(token) {
            Some(expires_at) => expires_at >= now,
            None => false,
        }
    }

    fn tidy(&self) -> NonceStatus {
        let now = self.clock.now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at >= now);
        let removed = before - entries.len();

        let issued = self.issued.load(Ordering::Acquire);
        let outstanding = entries.len() as u64;
        debug!(issued, outstanding, removed, "map nonce store tidied");

        NonceStatus {
            issued,
            outstanding,
            message: format!("{removed} expired entries removed"),
        }
    }

    fn is_strict(&self) -> bool {
        true
    }

    fn is_cross_node(&self) -> bool {
        false
    }
}
