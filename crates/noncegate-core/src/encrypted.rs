//! Encrypted, counter-based nonce service.
//!
//! Tokens carry `(counter, expiry)` sealed with a per-instance AES-256-GCM
//! key, so the service never stores issued tokens. Exactly-once redemption is
//! enforced by a watermark (`min_counter`) plus the per-bucket ledger for
//! counters redeemed out of order.
//!
//! ## Locking
//!
//! ```text
//! get:     draw suffix ─▶ [lock: allocate counter, read clock, record max] ─▶ seal
//! redeem:  open ─▶ freshness ─▶ watermark fast reject ─▶ [lock: check, reclaim, admit]
//! tidy:    [lock: reclaim]
//! ```
//!
//! Allocating the counter and reading the clock under the same lock keeps
//! counter order and expiry order aligned; the expired-bucket sweep relies on
//! it when it raises the watermark.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::codec::{NonceClaims, TokenCodec};
use crate::entropy::{EntropySource, OsEntropy};
use crate::error::{NonceError, NonceResult};
use crate::ledger::{Ledger, LedgerStats};
use crate::service::{validity_delta, IssuedNonce, NonceService, NonceStatus};

pub struct EncryptedNonceService {
    validity: TimeDelta,
    clock: Arc<dyn Clock>,
    entropy: Arc<dyn EntropySource>,
    codec: TokenCodec,
    next_counter: AtomicU64,
    min_counter: AtomicU64,
    issue_lock: Mutex<Ledger>,
}

impl fmt::Debug for EncryptedNonceService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedNonceService")
            .field("validity", &self.validity)
            .field("next_counter", &self.next_counter.load(Ordering::Relaxed))
            .field("min_counter", &self.min_counter.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EncryptedNonceService {
    /// Create a service on the system clock and OS entropy.
    pub fn new(validity: Duration) -> NonceResult<Self> {
        Self::with_capabilities(validity, Arc::new(SystemClock), Arc::new(OsEntropy))
    }

    /// Create a service on explicit clock and entropy capabilities.
    pub fn with_capabilities(
        validity: Duration,
        clock: Arc<dyn Clock>,
        entropy: Arc<dyn EntropySource>,
    ) -> NonceResult<Self> {
        let validity = validity_delta(validity)?;
        let codec = TokenCodec::generate(entropy.as_ref())?;

        debug!(
            validity_secs = validity.num_seconds(),
            "encrypted nonce service initialised"
        );

        Ok(Self {
            validity,
            clock,
            entropy,
            codec,
            next_counter: AtomicU64::new(0),
            min_counter: AtomicU64::new(0),
            issue_lock: Mutex::new(Ledger::new()),
        })
    }

    pub fn validity(&self) -> TimeDelta {
        self.validity
    }

    /// Snapshot of the ledger and counters.
    pub fn ledger_stats(&self) -> LedgerStats {
        let ledger = self.ledger();
        ledger.stats(
            self.min_counter.load(Ordering::Acquire),
            self.next_counter.load(Ordering::Acquire),
        )
    }

    // Panics abort the process under the workspace profiles, so a poisoned
    // guard only shows up in unwinding test builds.
    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.issue_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn issue(&self) -> NonceResult<IssuedNonce> {
        let suffix = TokenCodec::fresh_suffix(self.entropy.as_ref())?;

        let claims = {
            let mut ledger = self.ledger();
            let now = self.clock.now();
            let expiry = now
                .checked_add_signed(self.validity)
                .ok_or(NonceError::ClockOutOfRange {
                    timestamp: now.timestamp(),
                })?
                .timestamp();

            let counter = self.next_counter.fetch_add(1, Ordering::AcqRel) + 1;
            ledger.record_issue(expiry, counter);
            NonceClaims {
                counter,
                expiry_unix: expiry,
            }
        };

        let token = self.codec.seal(claims, &suffix)?;
        let expires_at =
            DateTime::from_timestamp(claims.expiry_unix, 0).ok_or(NonceError::ClockOutOfRange {
                timestamp: claims.expiry_unix,
            })?;

        trace!(expiry = claims.expiry_unix, "nonce issued");
        Ok(IssuedNonce { token, expires_at })
    }

    fn admit(&self, claims: NonceClaims, now: DateTime<Utc>) -> bool {
        let mut ledger = self.ledger();
        let mut min_counter = self.min_counter.load(Ordering::Acquire);
        if claims.counter <= min_counter {
            return false;
        }

        let bucket = claims.expiry_unix;
        if ledger.is_redeemed(bucket, claims.counter) {
            return false;
        }

        min_counter = ledger.reclaim(now.timestamp(), min_counter);
        let admitted = claims.counter > min_counter;
        if admitted {
            min_counter = ledger.admit(bucket, claims.counter, min_counter);
        }

        self.min_counter.store(min_counter, Ordering::Release);
        admitted
    }
}

impl NonceService for EncryptedNonceService {
    fn get(&self) -> NonceResult<IssuedNonce> {
        self.issue().inspect_err(|e| {
            warn!(error = %e, "nonce issuance failed");
        })
    }

    fn redeem(&self, token: &str) -> bool {
        let now = self.clock.now();

        let Some(claims) = self.codec.open(token) else {
            trace!("nonce rejected");
            return false;
        };

        let fresh = DateTime::from_timestamp(claims.expiry_unix, 0)
            .is_some_and(|expires_at| expires_at >= now);
        if !fresh || claims.counter <= self.min_counter.load(Ordering::Acquire) {
            trace!("nonce rejected");
            return false;
        }

        let admitted = self.admit(claims, now);
        if !admitted {
            trace!("nonce rejected");
        }
        admitted
    }

    fn tidy(&self) -> NonceStatus {
        let now = self.clock.now();
        let mut ledger = self.ledger();

        let min_counter = ledger.reclaim(now.timestamp(), self.min_counter.load(Ordering::Acquire));
        self.min_counter.store(min_counter, Ordering::Release);

        let issued = self.next_counter.load(Ordering::Acquire);
        let outstanding = issued.saturating_sub(min_counter);
        let message = format!(
            "{} issue buckets, {} redeemed out of order across {} buckets",
            ledger.issued_buckets(),
            ledger.redeemed_entries(),
            ledger.redeemed_buckets()
        );

        debug!(issued, outstanding, min_counter, "nonce ledger tidied");
        NonceStatus {
            issued,
            outstanding,
            message,
        }
    }

    fn is_strict(&self) -> bool {
        true
    }

    fn is_cross_node(&self) -> bool {
        false
    }
}
