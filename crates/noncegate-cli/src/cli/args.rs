use clap::{Parser, Subcommand, ValueEnum};
use noncegate_core::{Backend, DEFAULT_VALIDITY_SECS};

#[derive(Parser)]
#[command(
    name = "noncegate",
    version,
    about = "Strict exactly-once nonces: adversarial simulation and soak harness"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the forgery, differential and soak suite
    Sim(SimArgs),
    /// Hammer one backend with concurrent issue and racing redemption
    Soak(SoakArgs),
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Args, Clone, Debug)]
pub struct SimArgs {
    /// Suite tier (quick, nightly, stress)
    #[arg(long, default_value = "quick")]
    pub tier: String,

    /// Seed for reproducible runs (default: current unix time)
    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Clone, Debug)]
pub struct SoakArgs {
    /// Backend under test (encrypted, map)
    #[arg(long, env = "NONCEGATE_BACKEND", default_value = "encrypted")]
    pub backend: Backend,

    /// Worker threads for issue and redeem
    #[arg(long, default_value = "4")]
    pub threads: usize,

    /// Total tokens to issue
    #[arg(long, default_value = "10000")]
    pub tokens: usize,

    /// Token validity in seconds. Must be > 0.
    #[arg(long, env = "NONCEGATE_VALIDITY_SECS", default_value_t = DEFAULT_VALIDITY_SECS)]
    pub validity_secs: u64,

    /// Interval between background tidy passes. Must be > 0.
    #[arg(long, default_value = "250")]
    pub tidy_interval_ms: u64,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
