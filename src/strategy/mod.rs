//! Transaction strategy module
//!
//! Strategies are pure decision objects: they compute amounts and pick
//! transfer targets, nothing else. Generators receive them injected and never
//! own their configuration, so a run's amount heuristics can be swapped at
//! runtime without touching the submission machinery.

use std::sync::Arc;

use clap::ValueEnum;
use rust_decimal::Decimal;

use crate::types::AccountWithAsset;

pub mod deposit;
pub mod transfer;

pub use deposit::{FixedDepositStrategy, RandomDepositStrategy};
pub use transfer::{RandomTransferStrategy, RoundRobinTransferStrategy};

/// Decides the amount of each account's funding deposit
pub trait DepositStrategy: Send + Sync {
    /// Amount to deposit into `account`; non-positive amounts skip the deposit
    fn calculate_amount(&self, account: &AccountWithAsset) -> Decimal;
}

/// Decides amounts and counterparties of peer-to-peer transfers
pub trait TransferStrategy: Send + Sync {
    /// Amount `source` sends in its `iteration`-th transfer (0-based)
    fn calculate_amount(&self, source: &AccountWithAsset, iteration: usize) -> Decimal;

    /// Pick the account `source` sends to
    ///
    /// Must never return `source` itself. Returns `None` when `candidates`
    /// holds no other account.
    fn select_target_account<'a>(
        &self,
        source: &AccountWithAsset,
        candidates: &'a [AccountWithAsset],
    ) -> Option<&'a AccountWithAsset>;
}

/// Available strategy families
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyKind {
    /// Fixed amounts, deterministic round-robin targets
    Fixed,
    /// Random amounts within bounds, random targets
    Random,
}

/// Deposit and transfer strategies of one family
pub struct StrategyPair {
    pub deposit: Arc<dyn DepositStrategy>,
    pub transfer: Arc<dyn TransferStrategy>,
}

/// Create the strategy pair of the given family
///
/// `seed` makes the random family reproducible; the fixed family ignores it.
pub fn create_strategies(kind: StrategyKind, seed: Option<u64>) -> StrategyPair {
    match kind {
        StrategyKind::Fixed => StrategyPair {
            deposit: Arc::new(FixedDepositStrategy::default()),
            transfer: Arc::new(RoundRobinTransferStrategy::default()),
        },
        StrategyKind::Random => StrategyPair {
            deposit: Arc::new(RandomDepositStrategy::new(
                deposit::DEFAULT_MIN_DEPOSIT,
                deposit::DEFAULT_MAX_DEPOSIT,
                seed,
            )),
            transfer: Arc::new(RandomTransferStrategy::new(seed.map(|s| s.wrapping_add(1)))),
        },
    }
}

/// Accounts in `candidates` other than `source`
pub(crate) fn peers<'a: 's, 's>(
    source: &'s AccountWithAsset,
    candidates: &'a [AccountWithAsset],
) -> impl Iterator<Item = &'a AccountWithAsset> + 's {
    candidates
        .iter()
        .filter(move |candidate| candidate.account_id != source.account_id)
}
