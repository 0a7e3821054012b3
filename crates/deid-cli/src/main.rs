//! deid: reversible PII de-identification for parsed documents.

use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use deid_cli::cli::Args;
use deid_cli::run;

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match run::run(&args) {
        Ok(summary) if summary.failed == 0 => ExitCode::SUCCESS,
        Ok(summary) => {
            error!(
                "{} of {} documents failed",
                summary.failed,
                summary.failed + summary.processed
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            let code = e
                .downcast_ref::<deid_core::Error>()
                .map(|err| err.code())
                .unwrap_or("ERROR");
            eprintln!("deid: [{code}] {e:#}");
            ExitCode::FAILURE
        }
    }
}
