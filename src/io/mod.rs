//! I/O module
//!
//! Handles CSV input of account lists and CSV output of generated transactions.
//!
//! # Components
//!
//! - `csv_format` - CSV format handling (account list parsing, transaction output)

pub mod csv_format;

pub use csv_format::{
    convert_account_record, read_accounts, read_accounts_csv, write_transactions_csv,
    AccountCsvRecord, AccountEntry,
};
