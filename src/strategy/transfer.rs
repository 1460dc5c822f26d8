//! Transfer amount and target strategies

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use super::deposit::DEFAULT_DEPOSIT;
use super::{peers, TransferStrategy};
use crate::types::AccountWithAsset;

/// Default fixed transfer, 10.00
pub const DEFAULT_TRANSFER: Decimal = Decimal::from_parts(1_000, 0, 0, false, 2);

/// Smallest amount a strategy emits, 0.01
const MIN_AMOUNT: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Sends a random fraction of the source's deposit to a random peer
///
/// Fractions are expressed in basis points (1/10000). The defaults move
/// between 1% and 10% of the deposit per transfer, so a handful of transfers
/// never drain an account funded by its deposit.
#[derive(Debug)]
pub struct RandomTransferStrategy {
    min_bps: u32,
    max_bps: u32,
    rng: Mutex<StdRng>,
}

impl RandomTransferStrategy {
    pub const DEFAULT_MIN_BPS: u32 = 100;
    pub const DEFAULT_MAX_BPS: u32 = 1_000;

    pub fn new(seed: Option<u64>) -> Self {
        Self::with_fraction_bps(Self::DEFAULT_MIN_BPS, Self::DEFAULT_MAX_BPS, seed)
    }

    pub fn with_fraction_bps(min_bps: u32, max_bps: u32, seed: Option<u64>) -> Self {
        let (min_bps, max_bps) = if min_bps <= max_bps {
            (min_bps, max_bps)
        } else {
            (max_bps, min_bps)
        };
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        RandomTransferStrategy {
            min_bps: min_bps.max(1),
            max_bps: max_bps.clamp(1, 10_000),
            rng: Mutex::new(rng),
        }
    }

    fn rng(&self) -> std::sync::MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TransferStrategy for RandomTransferStrategy {
    fn calculate_amount(&self, source: &AccountWithAsset, _iteration: usize) -> Decimal {
        let base = source.deposit_amount.unwrap_or(DEFAULT_DEPOSIT);
        let bps = self.rng().gen_range(self.min_bps..=self.max_bps.max(self.min_bps));

        (base * Decimal::new(i64::from(bps), 4))
            .round_dp(2)
            .max(MIN_AMOUNT)
    }

    fn select_target_account<'a>(
        &self,
        source: &AccountWithAsset,
        candidates: &'a [AccountWithAsset],
    ) -> Option<&'a AccountWithAsset> {
        peers(source, candidates).choose(&mut *self.rng())
    }
}

/// Sends a fixed amount to each peer in turn
///
/// Every source keeps its own cursor over the partition, so repeated calls
/// walk the peers in slice order and wrap around.
#[derive(Debug)]
pub struct RoundRobinTransferStrategy {
    amount: Decimal,
    cursors: Mutex<HashMap<String, usize>>,
}

impl RoundRobinTransferStrategy {
    pub fn new(amount: Decimal) -> Self {
        RoundRobinTransferStrategy {
            amount,
            cursors: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for RoundRobinTransferStrategy {
    fn default() -> Self {
        RoundRobinTransferStrategy::new(DEFAULT_TRANSFER)
    }
}

impl TransferStrategy for RoundRobinTransferStrategy {
    fn calculate_amount(&self, _source: &AccountWithAsset, _iteration: usize) -> Decimal {
        self.amount
    }

    fn select_target_account<'a>(
        &self,
        source: &AccountWithAsset,
        candidates: &'a [AccountWithAsset],
    ) -> Option<&'a AccountWithAsset> {
        let available = peers(source, candidates).count();
        if available == 0 {
            return None;
        }

        let mut cursors = self.cursors.lock().unwrap_or_else(PoisonError::into_inner);
        let cursor = cursors.entry(source.account_id.clone()).or_insert(0);
        let position = *cursor % available;
        *cursor = cursor.wrapping_add(1);

        peers(source, candidates).nth(position)
    }
}
