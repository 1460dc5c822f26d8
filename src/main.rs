//! Ledger transaction generator CLI
//!
//! Generates balanced deposits and transfers for a set of accounts against a
//! simulated ledger and writes the created transactions to stdout as CSV.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- > transactions.csv
//! cargo run -- --accounts accounts.csv --transactions-per-account 5 > transactions.csv
//! cargo run -- --account-count 100 --assets USD,EUR --strategy fixed > transactions.csv
//! cargo run -- --failure-rate 0.3 --failure-threshold 3 --seed 7 > transactions.csv
//! ```
//!
//! Logs go to stderr. The filter comes from `RUST_LOG` when set, otherwise
//! from `--log-level`.
//!
//! # Exit Codes
//!
//! - 0: Success (individual transaction failures are logged, not fatal)
//! - 1: Error (account list not found or malformed, output not writable)

use ledger_txgen::cli;
use ledger_txgen::simulation;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = cli::parse_args();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut output = std::io::stdout();
    if let Err(e) = simulation::run_simulation(&args, &mut output) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
