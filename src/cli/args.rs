use crate::core::{CircuitBreakerConfig, ProgressOptions};
use crate::generation::{GeneratorConfig, OrchestratorConfig};
use crate::strategy::StrategyKind;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Generate double-entry test transactions against a simulated ledger
#[derive(Parser, Debug)]
#[command(name = "ledger-txgen")]
#[command(
    about = "Generate balanced deposits and transfers for a set of ledger accounts",
    long_about = None
)]
pub struct CliArgs {
    /// CSV account list (account_id,account_alias,asset_code)
    #[arg(
        long = "accounts",
        value_name = "FILE",
        help = "Account list CSV; synthetic accounts are generated when omitted"
    )]
    pub accounts_file: Option<PathBuf>,

    /// Number of synthetic accounts
    #[arg(
        long = "account-count",
        value_name = "COUNT",
        default_value_t = 10,
        help = "Number of synthetic accounts (ignored with --accounts)"
    )]
    pub account_count: usize,

    /// Asset codes synthetic accounts are spread across
    #[arg(
        long = "assets",
        value_name = "CODES",
        value_delimiter = ',',
        default_value = "BRL",
        help = "Comma separated asset codes for synthetic accounts"
    )]
    pub assets: Vec<String>,

    #[arg(long = "organization-id", value_name = "ID", default_value = "org-local")]
    pub organization_id: String,

    #[arg(long = "ledger-id", value_name = "ID", default_value = "ledger-local")]
    pub ledger_id: String,

    /// Transactions per account, the deposit included
    #[arg(
        long = "transactions-per-account",
        value_name = "COUNT",
        default_value_t = 3,
        help = "Transactions per account including its deposit"
    )]
    pub transactions_per_account: usize,

    /// Amount strategy family
    #[arg(
        long = "strategy",
        value_name = "STRATEGY",
        default_value = "random",
        help = "Amount strategy: 'fixed' or 'random'"
    )]
    pub strategy: StrategyKind,

    /// Seed for the random strategies and failure injection
    #[arg(long = "seed", value_name = "SEED")]
    pub seed: Option<u64>,

    /// Global budget of in-flight requests
    #[arg(
        long = "max-concurrency",
        value_name = "COUNT",
        help = "Maximum in-flight requests across all asset partitions (default: 50)"
    )]
    pub max_concurrency: Option<usize>,

    #[arg(long = "max-retries", value_name = "COUNT")]
    pub max_retries: Option<u32>,

    #[arg(long = "retry-delay-ms", value_name = "MS")]
    pub retry_delay_ms: Option<u64>,

    /// Account every deposit debits
    #[arg(
        long = "deposit-source",
        value_name = "ACCOUNT",
        default_value = crate::generation::DEFAULT_DEPOSIT_SOURCE,
        help = "Deposit source account; {asset} expands to the asset code"
    )]
    pub deposit_source: String,

    /// Pause of each worker slot after a request
    #[arg(long = "delay-ms", value_name = "MS", default_value_t = 0)]
    pub delay_between_transactions_ms: u64,

    /// Wait between deposits and transfers
    #[arg(long = "settlement-delay-ms", value_name = "MS", default_value_t = 0)]
    pub settlement_delay_ms: u64,

    /// Fallback asset of unresolvable accounts
    #[arg(long = "default-asset", value_name = "CODE", default_value = "BRL")]
    pub default_asset: String,

    #[arg(
        long = "lookup-concurrency",
        value_name = "COUNT",
        help = "Maximum concurrent account lookups (default: CPU cores)"
    )]
    pub lookup_concurrency: Option<usize>,

    #[arg(long = "failure-threshold", value_name = "COUNT")]
    pub failure_threshold: Option<u32>,

    #[arg(long = "recovery-timeout-ms", value_name = "MS")]
    pub recovery_timeout_ms: Option<u64>,

    /// Probability that the simulated ledger rejects a transaction with a 503
    #[arg(long = "failure-rate", value_name = "RATE", default_value_t = 0.0)]
    pub failure_rate: f64,

    /// Simulated latency of every ledger call
    #[arg(long = "latency-ms", value_name = "MS", default_value_t = 0)]
    pub latency_ms: u64,

    /// Interval of periodic progress lines; 0 disables them
    #[arg(long = "progress-interval-secs", value_name = "SECS", default_value_t = 5)]
    pub progress_interval_secs: u64,

    /// Log filter when RUST_LOG is unset
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}

impl CliArgs {
    /// Create a GeneratorConfig from CLI arguments
    ///
    /// Missing values take their defaults; invalid values are replaced by
    /// defaults with a warning.
    pub fn to_generator_config(&self) -> GeneratorConfig {
        let default = GeneratorConfig::default();
        GeneratorConfig::new(
            self.max_concurrency.unwrap_or(default.max_concurrency),
            self.max_retries.unwrap_or(default.max_retries),
            self.retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(default.retry_delay),
            Duration::from_millis(self.delay_between_transactions_ms),
            default.scale,
        )
        .with_deposit_source(self.deposit_source.clone())
    }

    /// Create an OrchestratorConfig from CLI arguments
    pub fn to_orchestrator_config(&self) -> OrchestratorConfig {
        let default = OrchestratorConfig::default();
        OrchestratorConfig::new(
            Duration::from_millis(self.settlement_delay_ms),
            self.default_asset.clone(),
            self.lookup_concurrency.unwrap_or(default.lookup_concurrency),
            self.to_generator_config(),
        )
    }

    /// Create a CircuitBreakerConfig from CLI arguments
    pub fn to_breaker_config(&self) -> CircuitBreakerConfig {
        if self.failure_threshold.is_none() && self.recovery_timeout_ms.is_none() {
            return CircuitBreakerConfig::default();
        }

        let default = CircuitBreakerConfig::default();
        let failure_threshold = self.failure_threshold.unwrap_or(default.failure_threshold);
        CircuitBreakerConfig::new(
            failure_threshold,
            self.recovery_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default.recovery_timeout),
            default.monitoring_period,
            default.minimum_requests.min(failure_threshold),
        )
    }

    /// Create ProgressOptions from CLI arguments
    pub fn to_progress_options(&self) -> ProgressOptions {
        ProgressOptions {
            update_interval: Duration::from_secs(self.progress_interval_secs),
            ..ProgressOptions::default()
        }
    }
}
