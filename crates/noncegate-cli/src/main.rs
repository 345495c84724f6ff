use clap::Parser;

mod cli;
pub mod exit_codes;

use cli::args::Cli;
use cli::commands::dispatch;

/// `env_logger` at `info` unless `RUST_LOG` says otherwise; core `tracing`
/// events arrive through the `log` bridge.
fn init_logging() {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
}

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    let code = dispatch(cli).await.unwrap_or_else(|e| {
        eprintln!("fatal: {e:?}");
        exit_codes::CONFIG_ERROR
    });
    std::process::exit(code);
}
