use crate::attacks;
use crate::differential;
use crate::report::{CheckResult, CheckStatus, SimReport};
use crate::soak::{self, SoakConfig};
use anyhow::Result;
use noncegate_core::{Backend, NonceConfig, SeededEntropy, SystemClock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteTier {
    Quick,
    Nightly,
    Stress,
}

impl SuiteTier {
    fn differential_iterations(self) -> usize {
        match self {
            SuiteTier::Quick => 5,
            SuiteTier::Nightly => 100,
            SuiteTier::Stress => 1000,
        }
    }

    fn soak_tokens(self) -> usize {
        match self {
            SuiteTier::Quick => 2_000,
            SuiteTier::Nightly => 50_000,
            SuiteTier::Stress => 250_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub tier: SuiteTier,
    pub seed: u64,
}

/// Time budget for the whole suite.
///
/// Once exceeded, remaining phases are skipped and the runner records a
/// `time_budget` error.
#[derive(Debug, Clone)]
pub struct TimeBudget {
    start: Instant,
    limit: Duration,
}

impl TimeBudget {
    pub fn new(limit: Duration) -> Self {
        Self {
            start: Instant::now(),
            limit,
        }
    }

    pub fn for_tier(tier: SuiteTier) -> Self {
        Self::new(match tier {
            SuiteTier::Quick => Duration::from_secs(60),
            SuiteTier::Nightly => Duration::from_secs(15 * 60),
            SuiteTier::Stress => Duration::from_secs(60 * 60),
        })
    }

    pub fn exceeded(&self) -> bool {
        self.start.elapsed() > self.limit
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.start.elapsed())
    }

    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

pub fn run_suite(cfg: SuiteConfig) -> Result<SimReport> {
    let mut report = SimReport::new(&format!("{:?}", cfg.tier), cfg.seed);
    let budget = TimeBudget::for_tier(cfg.tier);

    // 1. Forgery attacks (all tiers)
    {
        let start = Instant::now();
        let mut inner = SimReport::new("forgery", cfg.seed);
        let outcome = attacks::forgery::check_forgery_attacks(&mut inner, cfg.seed);
        report.merge(inner);
        if let Err(e) = outcome {
            report.add_result(CheckResult {
                name: "forgery_attacks".into(),
                status: CheckStatus::Error,
                message: Some(format!("{e:#}")),
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }
    }

    if out_of_time(&mut report, &budget, "forgery attacks") {
        return Ok(report);
    }

    // 2. Differential testing
    {
        let start = Instant::now();
        let outcome =
            differential::check_invariants(cfg.tier.differential_iterations(), Some(cfg.seed));
        report.add_check(
            "differential.invariants",
            outcome,
            start.elapsed().as_millis() as u64,
        );
    }

    if out_of_time(&mut report, &budget, "differential tests") {
        return Ok(report);
    }

    // 3. Concurrent soak against both backends
    for backend in [Backend::Encrypted, Backend::Map] {
        let start = Instant::now();
        let outcome = run_soak_check(backend, cfg.tier, cfg.seed);
        report.add_check(
            &format!("soak.{backend}"),
            outcome,
            start.elapsed().as_millis() as u64,
        );
        if out_of_time(&mut report, &budget, "soak") {
            break;
        }
    }

    Ok(report)
}

fn run_soak_check(backend: Backend, tier: SuiteTier, seed: u64) -> Result<()> {
    let service = NonceConfig::default()
        .with_backend(backend)
        .build_with(Arc::new(SystemClock), Arc::new(SeededEntropy::new(seed)))?;
    let cfg = SoakConfig {
        backend: backend.to_string(),
        threads: 4,
        tokens: tier.soak_tokens(),
    };

    let report = soak::run_soak(service, &cfg)?;
    if report.duplicate_wins > 0 {
        anyhow::bail!("{} tokens redeemed more than once", report.duplicate_wins);
    }
    if !report.pass_all {
        anyhow::bail!(
            "{} of {} tokens were never redeemed",
            report.unredeemed,
            report.tokens
        );
    }
    Ok(())
}

fn out_of_time(report: &mut SimReport, budget: &TimeBudget, phase: &str) -> bool {
    if !budget.exceeded() {
        return false;
    }
    report.add_result(CheckResult {
        name: "time_budget".into(),
        status: CheckStatus::Error,
        message: Some(format!("time budget exceeded after {phase}")),
        duration_ms: budget.elapsed_ms(),
    });
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_budget() {
        let budget = TimeBudget::new(Duration::from_secs(3600));
        assert!(!budget.exceeded());
        assert!(budget.remaining() > Duration::from_secs(3500));

        let spent = TimeBudget::new(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));
        assert!(spent.exceeded());
        assert_eq!(spent.remaining(), Duration::ZERO);
    }

    #[test]
    fn test_out_of_time_records_error() {
        let mut report = SimReport::new("unit", 0);
        let spent = TimeBudget::new(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(2));

        assert!(out_of_time(&mut report, &spent, "phase"));
        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.results[0].name, "time_budget");
    }

    #[test]
    fn test_tier_serde_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&SuiteTier::Nightly).unwrap(),
            "\"nightly\""
        );
    }
}
