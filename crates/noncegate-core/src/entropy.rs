//! Random byte capability.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};

use crate::error::{NonceError, NonceResult};

/// Source of random bytes for key material, token suffixes and map tokens.
pub trait EntropySource: Send + Sync {
    fn fill_random(&self, buf: &mut [u8]) -> NonceResult<()>;
}

/// Operating-system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill_random(&self, buf: &mut [u8]) -> NonceResult<()> {
        OsRng.try_fill_bytes(buf)?;
        Ok(())
    }
}

/// Deterministic byte source for tests and simulation runs.
///
/// Not suitable for production: anyone who knows the seed can reproduce
/// the key.
#[derive(Debug)]
pub struct SeededEntropy {
    rng: Mutex<StdRng>,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl EntropySource for SeededEntropy {
    fn fill_random(&self, buf: &mut [u8]) -> NonceResult<()> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        rng.fill_bytes(buf);
        Ok(())
    }
}

/// Byte source that succeeds a fixed number of times and fails afterwards.
///
/// Wraps a [`SeededEntropy`] for the successful fills.
#[derive(Debug)]
pub struct FailingEntropy {
    inner: SeededEntropy,
    remaining: AtomicUsize,
}

impl FailingEntropy {
    /// Allow `successes` fills before every further call fails.
    pub fn after(successes: usize, seed: u64) -> Self {
        Self {
            inner: SeededEntropy::new(seed),
            remaining: AtomicUsize::new(successes),
        }
    }

    /// Allow `n` more successful fills.
    pub fn refill(&self, n: usize) {
        self.remaining.fetch_add(n, Ordering::SeqCst);
    }
}

impl EntropySource for FailingEntropy {
    fn fill_random(&self, buf: &mut [u8]) -> NonceResult<()> {
        let granted = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if !granted {
            return Err(NonceError::Entropy {
                message: "entropy source exhausted".to_string(),
            });
        }
        self.inner.fill_random(buf)
    }
}
