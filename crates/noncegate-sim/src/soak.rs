//! Soak testing: concurrent issue and racing redemption against one
//! backend instance.
//!
//! Report schema: noncegate-soak-v1

use anyhow::{bail, Result};
use noncegate_core::{NonceService, NonceStatus};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Instant;

pub const SOAK_SCHEMA_VERSION: &str = "noncegate-soak-v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoakConfig {
    /// Label for the backend under test; only used in the report.
    pub backend: String,
    pub threads: usize,
    /// Total tokens issued across all workers.
    pub tokens: usize,
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            backend: "encrypted".to_string(),
            threads: 4,
            tokens: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SoakReport {
    pub schema_version: String,
    pub backend: String,
    pub threads: usize,
    pub tokens: usize,
    /// Tokens redeemed exactly once.
    pub admitted: usize,
    /// Tokens that more than one racer redeemed.
    pub duplicate_wins: usize,
    /// Tokens nobody redeemed (expired before the race reached them).
    pub unredeemed: usize,
    pub issue_ms: u64,
    pub redeem_ms: u64,
    pub pass_all: bool,
    pub final_status: NonceStatus,
}

/// Issue `cfg.tokens` tokens from `cfg.threads` workers, then let every
/// worker try to redeem every token.
pub fn run_soak(service: Arc<dyn NonceService>, cfg: &SoakConfig) -> Result<SoakReport> {
    if cfg.threads == 0 {
        bail!("soak needs at least one thread");
    }

    let issue_start = Instant::now();
    let tokens = issue_all(&service, cfg)?;
    let issue_ms = issue_start.elapsed().as_millis() as u64;

    let redeem_start = Instant::now();
    let wins = race_redeem(&service, tokens, cfg.threads)?;
    let redeem_ms = redeem_start.elapsed().as_millis() as u64;

    let admitted = wins.iter().filter(|&&w| w == 1).count();
    let duplicate_wins = wins.iter().filter(|&&w| w > 1).count();
    let unredeemed = wins.iter().filter(|&&w| w == 0).count();
    if duplicate_wins > 0 {
        tracing::error!(duplicate_wins, "tokens redeemed more than once");
    }

    let final_status = service.tidy();
    tracing::info!(
        backend = %cfg.backend,
        admitted,
        duplicate_wins,
        unredeemed,
        "soak finished"
    );

    Ok(SoakReport {
        schema_version: SOAK_SCHEMA_VERSION.to_string(),
        backend: cfg.backend.clone(),
        threads: cfg.threads,
        tokens: wins.len(),
        admitted,
        duplicate_wins,
        unredeemed,
        issue_ms,
        redeem_ms,
        pass_all: admitted == wins.len(),
        final_status,
    })
}

fn issue_all(service: &Arc<dyn NonceService>, cfg: &SoakConfig) -> Result<Vec<String>> {
    let (tx, rx) = mpsc::channel::<String>();
    let per_worker = cfg.tokens / cfg.threads;
    let remainder = cfg.tokens % cfg.threads;

    let handles: Vec<_> = (0..cfg.threads)
        .map(|worker| {
            let s = service.clone();
            let tx = tx.clone();
            let n = per_worker + usize::from(worker < remainder);
            thread::spawn(move || -> Result<()> {
                for _ in 0..n {
                    let issued = s.get()?;
                    if tx.send(issued.token).is_err() {
                        break;
                    }
                }
                Ok(())
            })
        })
        .collect();
    drop(tx);

    let tokens: Vec<String> = rx.into_iter().collect();
    for h in handles {
        match h.join() {
            Ok(result) => result?,
            Err(_) => bail!("issuer thread panicked"),
        }
    }
    Ok(tokens)
}

fn race_redeem(
    service: &Arc<dyn NonceService>,
    tokens: Vec<String>,
    threads: usize,
) -> Result<Vec<u32>> {
    let tokens = Arc::new(tokens);
    let wins: Arc<Vec<AtomicU32>> = Arc::new(tokens.iter().map(|_| AtomicU32::new(0)).collect());

    let handles: Vec<_> = (0..threads)
        .map(|worker| {
            let s = service.clone();
            let tokens = tokens.clone();
            let wins = wins.clone();
            thread::spawn(move || {
                let n = tokens.len();
                if n == 0 {
                    return;
                }
                // each worker starts at a different offset so racers collide
                // all over the token list
                let offset = worker * n / threads;
                for i in 0..n {
                    let idx = (i + offset) % n;
                    if s.redeem(&tokens[idx]) {
                        wins[idx].fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for h in handles {
        if h.join().is_err() {
            bail!("redeemer thread panicked");
        }
    }

    Ok(wins.iter().map(|w| w.load(Ordering::Relaxed)).collect())
}
