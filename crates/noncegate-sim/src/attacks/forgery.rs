use crate::mutators::{BitFlip, Extend, Mutator, Truncate};
use crate::report::{CheckResult, CheckStatus, SimReport};
use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use noncegate_core::{
    EncryptedNonceService, NonceService, SeededEntropy, StepClock, TOKEN_LEN, TOKEN_SENTINEL,
};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};

const START: i64 = 1_700_000_000;
const VALIDITY_SECS: u64 = 90;

// byte offsets inside a decoded token
const SUFFIX_END: usize = 14;
const COUNTER_END: usize = 22;
const EXPIRY_END: usize = 30;

/// Redeem forged and tampered tokens against a live encrypted service.
///
/// Each attack produces one or more candidate tokens; the attack is
/// `Bypassed` if any candidate is admitted.
pub fn check_forgery_attacks(report: &mut SimReport, seed: u64) -> Result<()> {
    let clock = Arc::new(StepClock::at_unix(START));
    let svc = EncryptedNonceService::with_capabilities(
        Duration::from_secs(VALIDITY_SECS),
        clock.clone(),
        Arc::new(SeededEntropy::new(seed)),
    )
    .context("failed to build target service")?;

    let original = svc.get()?.token;
    let other = svc.get()?.token;
    let raw = decode(&original)?;
    let other_raw = decode(&other)?;

    // 1. BitFlip over the decoded bytes
    run_attack(report, &svc, "forgery.bitflip", || {
        (0..32)
            .map(|i| {
                let flipped = BitFlip {
                    count: 1 + (i % 3) as usize,
                    seed: Some(seed.wrapping_add(i)),
                }
                .mutate(&raw)?;
                Ok(URL_SAFE_NO_PAD.encode(flipped))
            })
            .collect()
    })?;

    // 2. Character substitution in the transport encoding
    run_attack(report, &svc, "forgery.text_substitution", || {
        let mut rng = StdRng::seed_from_u64(seed);
        let alphabet = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";
        let mut out = Vec::new();
        for _ in 0..32 {
            let mut bytes = original.as_bytes().to_vec();
            let idx = rng.gen_range(0..bytes.len());
            let replacement = alphabet[rng.gen_range(0..alphabet.len())];
            if bytes[idx] == replacement {
                continue;
            }
            bytes[idx] = replacement;
            out.push(String::from_utf8(bytes)?);
        }
        Ok(out)
    })?;

    // 3. Truncation
    run_attack(report, &svc, "forgery.truncate", || {
        [0, 6, SUFFIX_END, EXPIRY_END, TOKEN_LEN - 1]
            .into_iter()
            .map(|at| Ok(URL_SAFE_NO_PAD.encode(Truncate { at }.mutate(&raw)?)))
            .collect()
    })?;

    // 4. Extension
    run_attack(report, &svc, "forgery.extend", || {
        [vec![0u8], vec![0u8; 3], raw.clone()]
            .into_iter()
            .map(|extra| Ok(URL_SAFE_NO_PAD.encode(Extend { extra }.mutate(&raw)?)))
            .collect()
    })?;

    // 5. Sentinel replacement
    run_attack(report, &svc, "forgery.sentinel", || {
        [b"vault1", b"VAULT0", b"\0\0\0\0\0\0"]
            .into_iter()
            .map(|sentinel| {
                let mut forged = raw.clone();
                forged[..TOKEN_SENTINEL.len()].copy_from_slice(sentinel);
                Ok(URL_SAFE_NO_PAD.encode(forged))
            })
            .collect()
    })?;

    // 6. Random bodies behind a valid sentinel
    run_attack(report, &svc, "forgery.random_body", || {
        let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);
        Ok((0..64)
            .map(|_| {
                let mut forged = vec![0u8; TOKEN_LEN];
                forged[..TOKEN_SENTINEL.len()].copy_from_slice(TOKEN_SENTINEL);
                rng.fill_bytes(&mut forged[TOKEN_SENTINEL.len()..]);
                URL_SAFE_NO_PAD.encode(forged)
            })
            .collect())
    })?;

    // 7. Splicing two valid tokens
    run_attack(report, &svc, "forgery.splice", || {
        let mut swapped_suffix = raw.clone();
        swapped_suffix[TOKEN_SENTINEL.len()..SUFFIX_END]
            .copy_from_slice(&other_raw[TOKEN_SENTINEL.len()..SUFFIX_END]);

        let mut swapped_counter = raw.clone();
        swapped_counter[SUFFIX_END..COUNTER_END]
            .copy_from_slice(&other_raw[SUFFIX_END..COUNTER_END]);

        let mut swapped_expiry = raw.clone();
        swapped_expiry[COUNTER_END..EXPIRY_END]
            .copy_from_slice(&other_raw[COUNTER_END..EXPIRY_END]);

        let mut swapped_tag = raw.clone();
        swapped_tag[EXPIRY_END..].copy_from_slice(&other_raw[EXPIRY_END..]);

        Ok([swapped_suffix, swapped_counter, swapped_expiry, swapped_tag]
            .into_iter()
            .map(|t| URL_SAFE_NO_PAD.encode(t))
            .collect())
    })?;

    // 8. Token sealed by a different instance
    run_attack(report, &svc, "forgery.foreign_instance", || {
        let foreign = EncryptedNonceService::with_capabilities(
            Duration::from_secs(VALIDITY_SECS),
            clock.clone(),
            Arc::new(SeededEntropy::new(seed.wrapping_add(1))),
        )?;
        // burn counters so the foreign token's counter is one the target
        // would otherwise accept
        let _ = foreign.get()?;
        let _ = foreign.get()?;
        Ok(vec![foreign.get()?.token])
    })?;

    // 9. Malformed input strings
    run_attack(report, &svc, "forgery.bad_input", || {
        Ok(vec![
            String::new(),
            "not-base64url!!".to_string(),
            URL_SAFE_NO_PAD.encode([0u8; TOKEN_LEN - 1]),
            format!("{original}=="),
            original.to_uppercase(),
            format!(" {original}"),
        ])
    })?;

    // The untouched token must still be redeemable exactly once.
    let start = Instant::now();
    let intact = if svc.redeem(&original) {
        Ok(())
    } else {
        Err(anyhow::anyhow!("valid token rejected after forgery attempts"))
    };
    report.add_check(
        "forgery.original_intact",
        intact,
        start.elapsed().as_millis() as u64,
    );

    // 10. Replay
    run_attack(report, &svc, "forgery.replay", || Ok(vec![original.clone()]))?;

    // 11. Expired token
    let stale = svc.get()?.token;
    clock.advance_secs(VALIDITY_SECS as i64 + 2);
    run_attack(report, &svc, "forgery.expired", || Ok(vec![stale.clone()]))?;

    Ok(())
}

fn decode(token: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(token)
        .context("service issued a token that is not base64url")
}

fn run_attack<F>(
    report: &mut SimReport,
    svc: &EncryptedNonceService,
    name: &str,
    candidates: F,
) -> Result<()>
where
    F: FnOnce() -> Result<Vec<String>>,
{
    let candidates = match candidates() {
        Ok(c) => c,
        Err(e) => {
            report.add_result(CheckResult {
                name: name.to_string(),
                status: CheckStatus::Error,
                message: Some(format!("failed to build candidates: {e:#}")),
                duration_ms: 0,
            });
            return Ok(());
        }
    };

    let start = Instant::now();
    let admitted = candidates.iter().filter(|t| svc.redeem(t)).count();
    let duration = start.elapsed().as_millis() as u64;

    if admitted > 0 {
        tracing::warn!(attack = name, admitted, "forged token admitted");
    }
    report.add_attack(name, admitted > 0, duration);
    Ok(())
}
