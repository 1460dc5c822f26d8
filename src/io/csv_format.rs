//! CSV format handling for account lists and generated transactions
//!
//! Input: an account list with columns `account_id, account_alias, asset_code`.
//! Alias and asset code are optional; accounts without an asset code are
//! resolved through the ledger like any other.
//!
//! Output: one row per created transaction with columns
//! `id, asset_code, amount, source, target, description`.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, Trim, Writer};
use serde::Deserialize;
use tracing::warn;

use crate::types::{AccountRef, GenerationError, Transaction};

/// One row of the account list
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AccountCsvRecord {
    pub account_id: String,
    #[serde(default)]
    pub account_alias: Option<String>,
    #[serde(default)]
    pub asset_code: Option<String>,
}

/// Account read from the account list
#[derive(Debug, Clone, PartialEq)]
pub struct AccountEntry {
    pub account: AccountRef,
    /// Asset code the list declares, upper-cased
    pub asset_code: Option<String>,
}

/// Convert a raw record, rejecting rows without an account id
pub fn convert_account_record(record: AccountCsvRecord) -> Result<AccountEntry, String> {
    let account_id = record.account_id.trim();
    if account_id.is_empty() {
        return Err("account_id must not be empty".to_string());
    }

    let non_empty = |value: Option<String>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let account = match non_empty(record.account_alias) {
        Some(alias) => AccountRef::with_alias(account_id, alias),
        None => AccountRef::new(account_id),
    };

    Ok(AccountEntry {
        account,
        asset_code: non_empty(record.asset_code).map(|code| code.to_uppercase()),
    })
}

/// Read an account list from any reader
///
/// Rows repeating an earlier account id are skipped with a warning.
pub fn read_accounts<R: Read>(input: R) -> Result<Vec<AccountEntry>, GenerationError> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(input);

    let mut entries: Vec<AccountEntry> = Vec::new();
    for (row, result) in reader.deserialize::<AccountCsvRecord>().enumerate() {
        let record = result?;
        // Header is line 1
        let line = row as u64 + 2;
        let entry = convert_account_record(record).map_err(|message| GenerationError::Parse {
            line: Some(line),
            message,
        })?;

        if entries
            .iter()
            .any(|existing| existing.account.account_id == entry.account.account_id)
        {
            warn!(
                line,
                account_id = %entry.account.account_id,
                "Skipping duplicate account"
            );
            continue;
        }
        entries.push(entry);
    }

    Ok(entries)
}

/// Read an account list from a file
pub fn read_accounts_csv(path: &Path) -> Result<Vec<AccountEntry>, GenerationError> {
    let file = File::open(path).map_err(|e| GenerationError::Io {
        message: format!("Failed to open {}: {}", path.display(), e),
    })?;
    read_accounts(file)
}

/// Write transactions as CSV, in the order given
///
/// Amounts are printed with the transaction's own scale.
pub fn write_transactions_csv(
    transactions: &[Transaction],
    output: &mut dyn Write,
) -> Result<(), GenerationError> {
    let mut writer = Writer::from_writer(output);

    writer.write_record(["id", "asset_code", "amount", "source", "target", "description"])?;

    for transaction in transactions {
        let amount = format!("{:.*}", transaction.scale as usize, transaction.amount);
        writer.write_record([
            transaction.id.as_str(),
            transaction.asset_code.as_str(),
            amount.as_str(),
            transaction.source_account_id().unwrap_or_default(),
            transaction.target_account_id().unwrap_or_default(),
            transaction.description.as_str(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metadata, TransactionRequest};
    use rstest::rstest;
    use rust_decimal_macros::dec;

    #[rstest]
    #[case::full("acc-1", Some("alice"), Some("usd"), Some("alice"), Some("USD"))]
    #[case::no_alias("acc-1", None, Some("BRL"), None, Some("BRL"))]
    #[case::blank_fields("acc-1", Some("  "), Some(""), None, None)]
    fn test_convert_account_record(
        #[case] account_id: &str,
        #[case] alias: Option<&str>,
        #[case] asset: Option<&str>,
        #[case] expected_alias: Option<&str>,
        #[case] expected_asset: Option<&str>,
    ) {
        let entry = convert_account_record(AccountCsvRecord {
            account_id: account_id.to_string(),
            account_alias: alias.map(str::to_string),
            asset_code: asset.map(str::to_string),
        })
        .unwrap();

        assert_eq!(entry.account.account_id, account_id);
        assert_eq!(entry.account.account_alias.as_deref(), expected_alias);
        assert_eq!(entry.asset_code.as_deref(), expected_asset);
    }

    #[test]
    fn test_read_accounts_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "account_id,account_alias,asset_code").unwrap();
        writeln!(file, "a, alice ,USD").unwrap();
        writeln!(file, "b,,brl").unwrap();
        writeln!(file, "a,again,USD").unwrap();
        writeln!(file, "c").unwrap();
        file.flush().unwrap();

        let entries = read_accounts_csv(file.path()).unwrap();

        let ids: Vec<&str> = entries.iter().map(|e| e.account.account_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(entries[0].account.account_alias.as_deref(), Some("alice"));
        assert_eq!(entries[1].asset_code.as_deref(), Some("BRL"));
        assert_eq!(entries[2].asset_code, None);
    }

    #[test]
    fn test_empty_account_id_reports_line() {
        let input = "account_id,account_alias,asset_code\na,,USD\n ,x,USD\n";

        let error = read_accounts(input.as_bytes()).unwrap_err();

        assert_eq!(
            error,
            GenerationError::Parse {
                line: Some(3),
                message: "account_id must not be empty".to_string()
            }
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let error = read_accounts_csv(Path::new("/nonexistent/accounts.csv")).unwrap_err();
        assert!(matches!(error, GenerationError::Io { .. }));
    }

    #[test]
    fn test_write_transactions_csv() {
        let deposit = TransactionRequest::transfer(
            "Deposit to a",
            "@external/USD",
            "a",
            dec!(100),
            2,
            "USD",
            Metadata::new(),
        );
        let transfer = TransactionRequest::transfer(
            "Transfer from a to b, urgent",
            "a",
            "b",
            dec!(2.5),
            2,
            "USD",
            Metadata::new(),
        );
        let transactions = vec![
            Transaction::from_request("tx-000001", &deposit),
            Transaction::from_request("tx-000002", &transfer),
        ];

        let mut output = Vec::new();
        write_transactions_csv(&transactions, &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "id,asset_code,amount,source,target,description\n\
             tx-000001,USD,100.00,@external/USD,a,Deposit to a\n\
             tx-000002,USD,2.50,a,b,\"Transfer from a to b, urgent\"\n"
        );
    }
}
