use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Serialize, Clone)]
pub struct SimReport {
    pub suite: String,
    pub seed: u64,
    pub summary: SimSummary,
    pub results: Vec<CheckResult>,
}

#[derive(Debug, Serialize, Clone, Default)]
pub struct SimSummary {
    pub total: usize,
    pub passed: usize,   // invariants held
    pub failed: usize,   // invariants broken
    pub blocked: usize,  // forged tokens rejected
    pub bypassed: usize, // forged tokens admitted
    pub errors: usize,
}

#[derive(Debug, Serialize, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Passed,
    Failed,
    Blocked,
    Bypassed,
    Error,
}

impl SimReport {
    pub fn new(suite: &str, seed: u64) -> Self {
        Self {
            suite: suite.to_string(),
            seed,
            summary: SimSummary::default(),
            results: Vec::new(),
        }
    }

    /// Record the outcome of redeeming a forged token.
    pub fn add_attack(&mut self, name: &str, admitted: bool, duration_ms: u64) {
        let (status, message) = if admitted {
            (CheckStatus::Bypassed, Some("forged token admitted".to_string()))
        } else {
            (CheckStatus::Blocked, None)
        };
        self.add_result(CheckResult {
            name: name.to_string(),
            status,
            message,
            duration_ms,
        });
    }

    /// Record an invariant check.
    pub fn add_check(&mut self, name: &str, result: Result<()>, duration_ms: u64) {
        let (status, message) = match result {
            Ok(()) => (CheckStatus::Passed, None),
            Err(e) => (CheckStatus::Failed, Some(format!("{e:#}"))),
        };
        self.add_result(CheckResult {
            name: name.to_string(),
            status,
            message,
            duration_ms,
        });
    }

    pub fn add_result(&mut self, result: CheckResult) {
        self.summary.total += 1;
        match result.status {
            CheckStatus::Passed => self.summary.passed += 1,
            CheckStatus::Failed => self.summary.failed += 1,
            CheckStatus::Blocked => self.summary.blocked += 1,
            CheckStatus::Bypassed => self.summary.bypassed += 1,
            CheckStatus::Error => self.summary.errors += 1,
        }
        self.results.push(result);
    }

    /// Fold another report's results into this one.
    pub fn merge(&mut self, other: SimReport) {
        for r in other.results {
            self.add_result(r);
        }
    }

    /// No invariant broke and no forgery got through.
    pub fn is_clean(&self) -> bool {
        self.summary.failed == 0 && self.summary.bypassed == 0 && self.summary.errors == 0
    }
}
