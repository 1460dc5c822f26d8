//! Account-related types for the generation engine
//!
//! - [`AccountRef`]: an account as named by the caller, before resolution
//! - [`LedgerAccount`]: the ledger's view of an account
//! - [`AccountWithAsset`]: a resolved account, ready for the generators

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account reference supplied by the caller of a generation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRef {
    /// Ledger account identifier
    pub account_id: String,
    /// Optional human readable alias
    pub account_alias: Option<String>,
}

impl AccountRef {
    pub fn new(account_id: impl Into<String>) -> Self {
        AccountRef {
            account_id: account_id.into(),
            account_alias: None,
        }
    }

    pub fn with_alias(account_id: impl Into<String>, alias: impl Into<String>) -> Self {
        AccountRef {
            account_id: account_id.into(),
            account_alias: Some(alias.into()),
        }
    }
}

/// Account as returned by the ledger's `get_account`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerAccount {
    pub id: String,
    pub alias: Option<String>,
    pub asset_code: String,
}

/// Account with its resolved asset code
///
/// Built once by account preparation and never mutated afterwards; the
/// generators only read it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountWithAsset {
    /// Ledger account identifier
    pub account_id: String,

    /// Human readable alias, if the caller supplied one
    pub account_alias: Option<String>,

    /// Asset (currency) code the account is denominated in
    ///
    /// Accounts are partitioned on this value: every transaction moves funds
    /// between accounts of a single asset.
    pub asset_code: String,

    /// Amount of the initial funding deposit
    ///
    /// Computed by the deposit strategy during account preparation. `None`
    /// lets the deposit generator ask the strategy itself.
    pub deposit_amount: Option<Decimal>,
}

impl AccountWithAsset {
    pub fn new(account_id: impl Into<String>, asset_code: impl Into<String>) -> Self {
        AccountWithAsset {
            account_id: account_id.into(),
            account_alias: None,
            asset_code: asset_code.into(),
            deposit_amount: None,
        }
    }

    pub fn with_deposit_amount(mut self, amount: Decimal) -> Self {
        self.deposit_amount = Some(amount);
        self
    }

    /// Alias when present, otherwise the account id
    pub fn display_name(&self) -> &str {
        self.account_alias.as_deref().unwrap_or(&self.account_id)
    }
}
