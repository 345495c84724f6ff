//! Differential testing: encrypted backend vs map backend vs a reference
//! model, driven by one seeded workload on a shared clock.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use noncegate_core::{
    Clock, EncryptedNonceService, MapNonceService, NonceService, NonceStatus, SeededEntropy,
    StepClock,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;

const START: i64 = 1_700_000_000;

/// One issued token per backend plus what the model knows about it.
struct Entry {
    encrypted: String,
    map: String,
    expires_at: DateTime<Utc>,
    redeemed: bool,
}

/// Reference model: a token is admitted iff it was issued, has not been
/// redeemed, and is not past its expiry.
#[derive(Default)]
struct Model {
    entries: Vec<Entry>,
}

impl Model {
    fn redeem(&mut self, idx: usize, now: DateTime<Utc>) -> bool {
        let entry = &mut self.entries[idx];
        let admitted = !entry.redeemed && entry.expires_at >= now;
        entry.redeemed = true;
        admitted
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Issue,
    Redeem,
    RedeemAny,
    /// Milliseconds, so expiries are crossed mid-second as well.
    AdvanceMillis(i64),
    Tidy,
    Garbage,
}

fn pick_op(rng: &mut StdRng, validity_secs: i64) -> Op {
    match rng.gen_range(0..100) {
        0..=34 => Op::Issue,
        35..=64 => Op::Redeem,
        65..=74 => Op::RedeemAny,
        75..=86 => Op::AdvanceMillis(rng.gen_range(1..=(validity_secs / 2 + 1) * 1000)),
        87..=94 => Op::Tidy,
        _ => Op::Garbage,
    }
}

struct Harness {
    clock: Arc<StepClock>,
    encrypted: EncryptedNonceService,
    map: MapNonceService,
    model: Model,
    last_issued: (u64, u64),
}

impl Harness {
    fn new(seed: u64, validity_secs: u64) -> Result<Self> {
        let clock = Arc::new(StepClock::at_unix(START));
        let validity = Duration::from_secs(validity_secs);
        let encrypted = EncryptedNonceService::with_capabilities(
            validity,
            clock.clone(),
            Arc::new(SeededEntropy::new(seed)),
        )?;
        let map = MapNonceService::with_capabilities(
            validity,
            clock.clone(),
            Arc::new(SeededEntropy::new(seed.rotate_left(17))),
        )?;
        Ok(Self {
            clock,
            encrypted,
            map,
            model: Model::default(),
            last_issued: (0, 0),
        })
    }

    fn issue(&mut self) -> Result<()> {
        let enc = self.encrypted.get().context("encrypted get failed")?;
        let map = self.map.get().context("map get failed")?;
        if enc.expires_at != map.expires_at {
            bail!(
                "expiry mismatch: encrypted {} vs map {}",
                enc.expires_at,
                map.expires_at
            );
        }
        self.model.entries.push(Entry {
            encrypted: enc.token,
            map: map.token,
            expires_at: enc.expires_at,
            redeemed: false,
        });
        Ok(())
    }

    fn redeem(&mut self, idx: usize) -> Result<()> {
        let now = self.clock.now();
        let enc = self.encrypted.redeem(&self.model.entries[idx].encrypted);
        let map = self.map.redeem(&self.model.entries[idx].map);
        let expected = self.model.redeem(idx, now);
        if enc != expected || map != expected {
            bail!(
                "redeem outcome diverged for token #{idx}: model={expected} encrypted={enc} map={map}"
            );
        }
        Ok(())
    }

    fn tidy(&mut self) -> Result<()> {
        let enc = self.encrypted.tidy();
        let map = self.map.tidy();
        let issued = self.model.entries.len() as u64;

        for (name, status, last) in [
            ("encrypted", &enc, self.last_issued.0),
            ("map", &map, self.last_issued.1),
        ] {
            if status.issued < last {
                bail!("{name}: issued went backwards ({last} -> {})", status.issued);
            }
            if status.issued != issued {
                bail!("{name}: issued {} but model issued {issued}", status.issued);
            }
        }
        self.last_issued = (enc.issued, map.issued);

        check_idempotent("encrypted", &enc, &self.encrypted.tidy())?;
        check_idempotent("map", &map, &self.map.tidy())?;
        Ok(())
    }
}

// Messages report per-call work, so only the counts are compared.
fn check_idempotent(name: &str, first: &NonceStatus, second: &NonceStatus) -> Result<()> {
    if (first.issued, first.outstanding) != (second.issued, second.outstanding) {
        bail!("{name}: tidy not idempotent: {first} then {second}");
    }
    Ok(())
}

/// Run `iterations` independent workloads; any divergence is an error.
pub fn check_invariants(iterations: usize, seed: Option<u64>) -> Result<()> {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    tracing::info!(iterations, "running differential workload");

    for i in 0..iterations {
        let run_seed = rng.gen::<u64>();
        let validity_secs = rng.gen_range(1..=30u64);
        let ops = rng.gen_range(50..400);
        run_workload(run_seed, validity_secs, ops).with_context(|| {
            format!(
                "invariant broken in iteration {i} (run seed {run_seed}, validity {validity_secs}s)"
            )
        })?;
    }

    tracing::info!(iterations, "differential workload passed");
    Ok(())
}

fn run_workload(seed: u64, validity_secs: u64, ops: usize) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut h = Harness::new(seed, validity_secs)?;

    for _ in 0..ops {
        match pick_op(&mut rng, validity_secs as i64) {
            Op::Issue => h.issue()?,
            Op::Redeem => {
                let pending: Vec<usize> = h
                    .model
                    .entries
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| !e.redeemed)
                    .map(|(i, _)| i)
                    .collect();
                if !pending.is_empty() {
                    h.redeem(pending[rng.gen_range(0..pending.len())])?;
                }
            }
            Op::RedeemAny => {
                if !h.model.entries.is_empty() {
                    h.redeem(rng.gen_range(0..h.model.entries.len()))?;
                }
            }
            Op::AdvanceMillis(ms) => h.clock.advance(TimeDelta::milliseconds(ms)),
            Op::Tidy => h.tidy()?,
            Op::Garbage => {
                let junk: String = (0..rng.gen_range(0..70))
                    .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
                    .collect();
                if h.encrypted.redeem(&junk) || h.map.redeem(&junk) {
                    bail!("garbage input {junk:?} was admitted");
                }
            }
        }
    }

    // drain: everything left must agree as well
    for idx in 0..h.model.entries.len() {
        h.redeem(idx)?;
    }
    h.tidy()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_workloads_agree() {
        check_invariants(10, Some(7)).unwrap();
    }

    #[test]
    fn test_model_rejects_second_redeem_and_stale() {
        let now = DateTime::from_timestamp(START, 0).unwrap();
        let mut model = Model::default();
        for offset in [10, -1] {
            model.entries.push(Entry {
                encrypted: String::new(),
                map: String::new(),
                expires_at: now + TimeDelta::seconds(offset),
                redeemed: false,
            });
        }

        assert!(model.redeem(0, now));
        assert!(!model.redeem(0, now));
        assert!(!model.redeem(1, now));
    }
}
