//! Adversarial and differential harness for the nonce service.

pub mod attacks;
pub mod differential;
pub mod mutators;
pub mod report;
pub mod soak;
pub mod suite;

pub use report::{CheckResult, CheckStatus, SimReport, SimSummary};
pub use soak::{run_soak, SoakConfig, SoakReport};
pub use suite::{run_suite, SuiteConfig, SuiteTier, TimeBudget};
