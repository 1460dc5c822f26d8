//! Deposit amount strategies

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::DepositStrategy;
use crate::types::AccountWithAsset;

/// Default fixed deposit, 1000.00
pub const DEFAULT_DEPOSIT: Decimal = Decimal::from_parts(100_000, 0, 0, false, 2);
/// Lower bound of random deposits, 100.00
pub const DEFAULT_MIN_DEPOSIT: Decimal = Decimal::from_parts(10_000, 0, 0, false, 2);
/// Upper bound of random deposits, 10000.00
pub const DEFAULT_MAX_DEPOSIT: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 2);

/// Random amounts are drawn in minor units of this scale
const RANDOM_SCALE: u32 = 2;

/// Deposits the same amount into every account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDepositStrategy {
    amount: Decimal,
}

impl FixedDepositStrategy {
    pub fn new(amount: Decimal) -> Self {
        FixedDepositStrategy { amount }
    }
}

impl Default for FixedDepositStrategy {
    fn default() -> Self {
        FixedDepositStrategy::new(DEFAULT_DEPOSIT)
    }
}

impl DepositStrategy for FixedDepositStrategy {
    fn calculate_amount(&self, _account: &AccountWithAsset) -> Decimal {
        self.amount
    }
}

/// Deposits a uniformly random amount within `[min, max]`
///
/// Amounts carry two decimal places. With a seed the sequence of amounts is
/// reproducible, which the CLI exposes for repeatable runs.
#[derive(Debug)]
pub struct RandomDepositStrategy {
    min_minor: i64,
    max_minor: i64,
    rng: Mutex<StdRng>,
}

impl RandomDepositStrategy {
    /// Bounds are swapped if given in the wrong order
    pub fn new(min: Decimal, max: Decimal, seed: Option<u64>) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        RandomDepositStrategy {
            min_minor: to_minor_units(min),
            max_minor: to_minor_units(max),
            rng: Mutex::new(rng),
        }
    }
}

fn to_minor_units(amount: Decimal) -> i64 {
    (amount * Decimal::from(10i64.pow(RANDOM_SCALE)))
        .trunc()
        .to_i64()
        .unwrap_or(0)
        .max(1)
}

impl DepositStrategy for RandomDepositStrategy {
    fn calculate_amount(&self, _account: &AccountWithAsset) -> Decimal {
        let minor = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .gen_range(self.min_minor..=self.max_minor);
        Decimal::new(minor, RANDOM_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn account() -> AccountWithAsset {
        AccountWithAsset::new("acc-1", "BRL")
    }

    #[test]
    fn test_fixed_deposit_ignores_account() {
        let strategy = FixedDepositStrategy::new(dec!(250.50));

        assert_eq!(strategy.calculate_amount(&account()), dec!(250.50));
        assert_eq!(
            strategy.calculate_amount(&AccountWithAsset::new("other", "USD")),
            dec!(250.50)
        );
    }

    #[test]
    fn test_default_constants() {
        assert_eq!(DEFAULT_DEPOSIT, dec!(1000.00));
        assert_eq!(DEFAULT_MIN_DEPOSIT, dec!(100.00));
        assert_eq!(DEFAULT_MAX_DEPOSIT, dec!(10000.00));
    }

    #[test]
    fn test_random_deposit_stays_within_bounds() {
        let strategy = RandomDepositStrategy::new(dec!(10), dec!(20), Some(7));

        for _ in 0..500 {
            let amount = strategy.calculate_amount(&account());
            assert!(amount >= dec!(10) && amount <= dec!(20), "{amount}");
            assert!(amount.scale() <= 2);
        }
    }

    #[test]
    fn test_random_deposit_is_reproducible_with_seed() {
        let first = RandomDepositStrategy::new(dec!(1), dec!(1000), Some(42));
        let second = RandomDepositStrategy::new(dec!(1), dec!(1000), Some(42));

        let a: Vec<Decimal> = (0..20).map(|_| first.calculate_amount(&account())).collect();
        let b: Vec<Decimal> = (0..20).map(|_| second.calculate_amount(&account())).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_swapped_bounds() {
        let strategy = RandomDepositStrategy::new(dec!(5), dec!(5), Some(1));
        assert_eq!(strategy.calculate_amount(&account()), dec!(5.00));

        let strategy = RandomDepositStrategy::new(dec!(9), dec!(3), Some(1));
        let amount = strategy.calculate_amount(&account());
        assert!(amount >= dec!(3) && amount <= dec!(9));
    }
}
