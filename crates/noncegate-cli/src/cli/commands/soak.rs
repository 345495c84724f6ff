use crate::cli::args::{OutputFormat, SoakArgs};
use crate::exit_codes::{CONFIG_ERROR, INVARIANT_FAILED, SUCCESS};
use anyhow::{Context, Result};
use noncegate_core::{NonceConfig, NonceService};
use noncegate_sim::{run_soak, SoakConfig, SoakReport};
use std::sync::Arc;
use std::time::Duration;

pub async fn run(args: SoakArgs) -> Result<i32> {
    if args.threads == 0 {
        eprintln!("Config error: --threads must be > 0");
        return Ok(CONFIG_ERROR);
    }
    if args.tidy_interval_ms == 0 {
        eprintln!("Config error: --tidy-interval-ms must be > 0");
        return Ok(CONFIG_ERROR);
    }

    let config = NonceConfig::default()
        .with_backend(args.backend)
        .with_validity_secs(args.validity_secs);
    let service = match config.build() {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Config error: {e}");
            return Ok(CONFIG_ERROR);
        }
    };

    let tidier = spawn_tidier(service.clone(), Duration::from_millis(args.tidy_interval_ms));

    let soak_cfg = SoakConfig {
        backend: args.backend.to_string(),
        threads: args.threads,
        tokens: args.tokens,
    };
    let worker = service.clone();
    let outcome = tokio::task::spawn_blocking(move || run_soak(worker, &soak_cfg)).await;
    tidier.abort();
    let report = outcome.context("soak worker panicked")??;

    match args.format {
        OutputFormat::Text => print_summary(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if report.duplicate_wins > 0 || !report.pass_all {
        return Ok(INVARIANT_FAILED);
    }
    Ok(SUCCESS)
}

fn spawn_tidier(service: Arc<dyn NonceService>, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let status = service.tidy();
            tracing::debug!(
                issued = status.issued,
                outstanding = status.outstanding,
                "periodic tidy"
            );
        }
    })
}

fn print_summary(report: &SoakReport) {
    println!("Noncegate Soak ({})", report.backend);
    println!("  threads:        {}", report.threads);
    println!("  tokens:         {}", report.tokens);
    println!("  admitted once:  {}", report.admitted);
    println!("  duplicate wins: {}", report.duplicate_wins);
    println!("  unredeemed:     {}", report.unredeemed);
    println!("  issue:          {} ms", report.issue_ms);
    println!("  redeem:         {} ms", report.redeem_ms);
    println!("  final status:   {}", report.final_status);
    println!("  result:         {}", if report.pass_all { "PASS" } else { "FAIL" });
}
