//! Transaction-related types for the generation engine
//!
//! This module defines the double-entry request shape submitted to the ledger
//! and the transaction the ledger hands back.
//!
//! # Double-Entry Invariant
//!
//! Every [`TransactionRequest`] must have `sum(DEBIT) == sum(CREDIT)` with every
//! leg in one asset code. [`TransactionRequest::transfer`] builds requests that
//! hold it by construction and [`TransactionRequest::validate_balanced`] checks
//! requests assembled any other way.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::LedgerError;

/// Free-form key/value metadata attached to a transaction
pub type Metadata = BTreeMap<String, String>;

/// Direction of a single transaction leg
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationType {
    /// Funds leave the account
    Debit,
    /// Funds enter the account
    Credit,
}

/// Monetary amount of one leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Amount {
    /// Amount value, already rounded to `scale` decimal places
    pub value: Decimal,
    /// Number of decimal places of the asset
    pub scale: u32,
    /// Asset (currency) code
    pub asset_code: String,
}

/// One leg of a double-entry transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Account the leg applies to
    pub account_id: String,
    /// Debit or credit
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    /// Amount moved by this leg
    pub amount: Amount,
}

/// Transaction creation request as consumed by the ledger client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    /// Human readable description
    pub description: String,
    /// Total amount moved
    pub amount: Decimal,
    /// Decimal places of `amount`
    pub scale: u32,
    /// Asset code shared by every leg
    pub asset_code: String,
    /// Request metadata
    pub metadata: Metadata,
    /// Debit and credit legs
    pub operations: Vec<Operation>,
}

impl TransactionRequest {
    /// Build a balanced two-leg request moving `amount` from `source` to `target`
    ///
    /// The amount is rounded to `scale` decimal places before both legs are
    /// built, so the debit and the credit always carry the same value.
    pub fn transfer(
        description: impl Into<String>,
        source_account_id: impl Into<String>,
        target_account_id: impl Into<String>,
        amount: Decimal,
        scale: u32,
        asset_code: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        let asset_code = asset_code.into();
        let value = amount.round_dp(scale);
        let leg = |account_id: String, operation_type| Operation {
            account_id,
            operation_type,
            amount: Amount {
                value,
                scale,
                asset_code: asset_code.clone(),
            },
        };

        let operations = vec![
            leg(source_account_id.into(), OperationType::Debit),
            leg(target_account_id.into(), OperationType::Credit),
        ];

        TransactionRequest {
            description: description.into(),
            amount: value,
            scale,
            asset_code: asset_code.clone(),
            metadata,
            operations,
        }
    }

    /// Sum of all debit legs
    pub fn debit_total(&self) -> Decimal {
        self.total_of(OperationType::Debit)
    }

    /// Sum of all credit legs
    pub fn credit_total(&self) -> Decimal {
        self.total_of(OperationType::Credit)
    }

    fn total_of(&self, operation_type: OperationType) -> Decimal {
        self.operations
            .iter()
            .filter(|op| op.operation_type == operation_type)
            .map(|op| op.amount.value)
            .sum()
    }

    /// Check the double-entry invariant
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidRequest` when the request has no legs, a
    /// non-positive amount, a leg in another asset, or debits that do not
    /// equal credits.
    pub fn validate_balanced(&self) -> Result<(), LedgerError> {
        if self.operations.is_empty() {
            return Err(LedgerError::invalid_request("transaction has no operations"));
        }

        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_request(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }

        if let Some(op) = self
            .operations
            .iter()
            .find(|op| op.amount.asset_code != self.asset_code)
        {
            return Err(LedgerError::invalid_request(format!(
                "operation on {} uses asset {} but transaction uses {}",
                op.account_id, op.amount.asset_code, self.asset_code
            )));
        }

        let debits = self.debit_total();
        let credits = self.credit_total();
        if debits != credits || debits != self.amount {
            return Err(LedgerError::invalid_request(format!(
                "unbalanced transaction: debits {} credits {} amount {}",
                debits, credits, self.amount
            )));
        }

        Ok(())
    }

    /// Account of the first debit leg
    pub fn source_account_id(&self) -> Option<&str> {
        self.first_account(OperationType::Debit)
    }

    /// Account of the first credit leg
    pub fn target_account_id(&self) -> Option<&str> {
        self.first_account(OperationType::Credit)
    }

    fn first_account(&self, operation_type: OperationType) -> Option<&str> {
        self.operations
            .iter()
            .find(|op| op.operation_type == operation_type)
            .map(|op| op.account_id.as_str())
    }
}

/// Transaction created by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Identifier assigned by the ledger
    pub id: String,
    /// Description copied from the request
    pub description: String,
    /// Asset code of every leg
    pub asset_code: String,
    /// Total amount moved
    pub amount: Decimal,
    /// Decimal places of `amount`
    pub scale: u32,
    /// Metadata copied from the request
    pub metadata: Metadata,
    /// Debit and credit legs
    pub operations: Vec<Operation>,
}

impl Transaction {
    /// Build the ledger's view of a request once it has been assigned an id
    pub fn from_request(id: impl Into<String>, request: &TransactionRequest) -> Self {
        Transaction {
            id: id.into(),
            description: request.description.clone(),
            asset_code: request.asset_code.clone(),
            amount: request.amount,
            scale: request.scale,
            metadata: request.metadata.clone(),
            operations: request.operations.clone(),
        }
    }

    /// Account of the first debit leg
    pub fn source_account_id(&self) -> Option<&str> {
        self.operations
            .iter()
            .find(|op| op.operation_type == OperationType::Debit)
            .map(|op| op.account_id.as_str())
    }

    /// Account of the first credit leg
    pub fn target_account_id(&self) -> Option<&str> {
        self.operations
            .iter()
            .find(|op| op.operation_type == OperationType::Credit)
            .map(|op| op.account_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_request() -> TransactionRequest {
        TransactionRequest::transfer(
            "Test transfer",
            "acc-1",
            "acc-2",
            dec!(12.345),
            2,
            "USD",
            Metadata::new(),
        )
    }

    #[test]
    fn test_transfer_builds_balanced_legs() {
        let request = sample_request();

        assert_eq!(request.amount, dec!(12.34));
        assert_eq!(request.operations.len(), 2);
        assert_eq!(request.debit_total(), request.credit_total());
        assert_eq!(request.source_account_id(), Some("acc-1"));
        assert_eq!(request.target_account_id(), Some("acc-2"));
        assert!(request
            .operations
            .iter()
            .all(|op| op.amount.asset_code == "USD" && op.amount.scale == 2));
        assert!(request.validate_balanced().is_ok());
    }

    #[test]
    fn test_validate_rejects_unbalanced_request() {
        let mut request = sample_request();
        request.operations[1].amount.value = dec!(10.00);

        let error = request.validate_balanced().unwrap_err();
        assert!(matches!(error, LedgerError::InvalidRequest { .. }));
        assert!(error.to_string().contains("unbalanced"));
    }

    #[test]
    fn test_validate_rejects_mixed_assets() {
        let mut request = sample_request();
        request.operations[0].amount.asset_code = "EUR".to_string();

        let error = request.validate_balanced().unwrap_err();
        assert!(error.to_string().contains("uses asset EUR"));
    }

    #[test]
    fn test_validate_rejects_non_positive_amount() {
        let request = TransactionRequest::transfer(
            "zero",
            "acc-1",
            "acc-2",
            Decimal::ZERO,
            2,
            "USD",
            Metadata::new(),
        );
        assert!(request.validate_balanced().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_operations() {
        let mut request = sample_request();
        request.operations.clear();
        assert!(request.validate_balanced().is_err());
    }

    #[test]
    fn test_request_serializes_in_ledger_wire_shape() {
        let request = sample_request();
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["assetCode"], "USD");
        assert_eq!(json["scale"], 2);
        assert_eq!(json["operations"][0]["type"], "DEBIT");
        assert_eq!(json["operations"][0]["accountId"], "acc-1");
        assert_eq!(json["operations"][1]["type"], "CREDIT");
        assert_eq!(json["operations"][1]["amount"]["assetCode"], "USD");
    }

    #[test]
    fn test_transaction_from_request_keeps_legs() {
        let request = sample_request();
        let transaction = Transaction::from_request("tx-1", &request);

        assert_eq!(transaction.id, "tx-1");
        assert_eq!(transaction.amount, request.amount);
        assert_eq!(transaction.source_account_id(), Some("acc-1"));
        assert_eq!(transaction.target_account_id(), Some("acc-2"));
    }
}
