use crate::cli::args::{OutputFormat, SimArgs};
use crate::exit_codes::{CONFIG_ERROR, INVARIANT_FAILED, SUCCESS};
use anyhow::{Context, Result};
use noncegate_sim::{run_suite, SimReport, SuiteConfig, SuiteTier};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn run(args: SimArgs) -> Result<i32> {
    let tier = match args.tier.trim().to_lowercase().as_str() {
        "quick" => SuiteTier::Quick,
        "nightly" => SuiteTier::Nightly,
        "stress" => SuiteTier::Stress,
        _ => {
            eprintln!("Config error: unknown suite tier: {}", args.tier);
            return Ok(CONFIG_ERROR);
        }
    };

    let seed = match args.seed {
        Some(seed) => seed,
        None => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock is before the unix epoch")?
            .as_secs(),
    };

    let config = SuiteConfig { tier, seed };
    if args.format == OutputFormat::Text {
        println!("Noncegate Simulation");
        println!("====================");
        println!("Tier: {:?}", config.tier);
        println!("Seed: {}", config.seed);
        println!();
    }

    let report = run_suite(config).context("simulation suite failed")?;
    match args.format {
        OutputFormat::Text => print_table(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if report.summary.bypassed > 0 {
        eprintln!(
            "FAIL: {} forged or replayed tokens were admitted",
            report.summary.bypassed
        );
        return Ok(INVARIANT_FAILED);
    }
    if !report.is_clean() {
        return Ok(INVARIANT_FAILED);
    }
    Ok(SUCCESS)
}

fn print_table(report: &SimReport) {
    println!("{:<35} {:<10} {:<10}", "ATTACK/CHECK", "STATUS", "DUR(ms)");
    println!("{:-<35} {:-<10} {:-<10}", "", "", "");
    for res in &report.results {
        println!(
            "{:<35} {:<10} {:<10}",
            res.name,
            format!("{:?}", res.status),
            res.duration_ms
        );
        if let Some(msg) = &res.message {
            println!("    {msg}");
        }
    }
    println!();
    println!(
        "SUMMARY: blocked={} passed={} bypassed={} failed={} errors={}",
        report.summary.blocked,
        report.summary.passed,
        report.summary.bypassed,
        report.summary.failed,
        report.summary.errors
    );
}
