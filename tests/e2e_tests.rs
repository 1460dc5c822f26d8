//! End-to-end integration tests
//!
//! These tests run complete generations against the in-memory ledger. The
//! fixture tests:
//! 1. Read accounts.csv from a fixture directory
//! 2. Run a generation with the deterministic `fixed` strategies
//! 3. Write the created transactions as CSV
//! 4. Compare them with expected.csv
//!
//! Transaction ids depend on completion order, so the comparison projects
//! each row to `asset_code,amount,source,target` and ignores row order.
//!
//! Fixtures are located in tests/fixtures/ and cover:
//! - A single asset partition with deposits and transfers
//! - Several assets, including a partition too small for transfers
//! - Accounts whose asset falls back to the default
//! - Deposits only, with a duplicate account row

#[cfg(test)]
mod tests {
    use clap::Parser;
    use ledger_txgen::cli::CliArgs;
    use ledger_txgen::core::CircuitState;
    use ledger_txgen::ledger::InMemoryLedger;
    use ledger_txgen::simulation::{build_ledger, load_accounts, run_simulation, simulate};
    use ledger_txgen::types::{LedgerError, OperationType};
    use rstest::rstest;
    use rust_decimal::Decimal;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn parse(extra: &[&str]) -> CliArgs {
        let mut args = vec![
            "program",
            "--progress-interval-secs",
            "0",
            "--settlement-delay-ms",
            "0",
            "--retry-delay-ms",
            "1",
        ];
        args.extend_from_slice(extra);
        CliArgs::try_parse_from(args).unwrap()
    }

    /// Rows of a transaction CSV reduced to `asset_code,amount,source,target`, sorted
    fn project(output: &str) -> Vec<String> {
        let mut reader = csv::Reader::from_reader(output.as_bytes());
        let mut rows: Vec<String> = reader
            .records()
            .map(|record| {
                let record = record.unwrap();
                format!("{},{},{},{}", &record[1], &record[2], &record[3], &record[4])
            })
            .collect();
        rows.sort();
        rows
    }

    /// Data rows of an expected.csv, sorted
    fn expected_rows(contents: &str) -> Vec<String> {
        let mut rows: Vec<String> = contents
            .lines()
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect();
        rows.sort();
        rows
    }

    /// Run a fixture through the CLI pipeline and compare with expected.csv
    ///
    /// # Panics
    ///
    /// Panics if fixture files cannot be read or the output differs.
    fn run_test_fixture(fixture_name: &str, transactions_per_account: usize) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let accounts_path = format!("{}/accounts.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        assert!(
            Path::new(&accounts_path).exists(),
            "Accounts file not found: {}",
            accounts_path
        );

        let per_account = transactions_per_account.to_string();
        let args = parse(&[
            "--accounts",
            &accounts_path,
            "--strategy",
            "fixed",
            "--transactions-per-account",
            &per_account,
        ]);

        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");
        let outcome = run_simulation(&args, &mut temp_output)
            .unwrap_or_else(|e| panic!("Failed to run simulation: {}", e));
        temp_output.flush().expect("Failed to flush temp file");

        let actual_output = fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e));
        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            project(&actual_output),
            expected_rows(&expected_output),
            "\n\nOutput mismatch for fixture: {}\n\nActual output:\n{}\n",
            fixture_name,
            actual_output
        );
        assert_eq!(outcome.transaction_errors, 0);
        assert_eq!(outcome.transactions_created as usize, outcome.transactions.len());
        assert_eq!(outcome.recorded_ids, outcome.transactions.len());
    }

    #[rstest]
    #[case("happy_path", 3)]
    #[case("multiple_assets", 2)]
    #[case("fallback_asset", 2)]
    #[case("deposits_only", 1)]
    fn test_fixtures(#[case] fixture: &str, #[case] transactions_per_account: usize) {
        run_test_fixture(fixture, transactions_per_account);
    }

    #[rstest]
    #[case::single_asset(&["--account-count", "12"], 12)]
    #[case::three_assets(&["--account-count", "30", "--assets", "USD,EUR,BRL"], 30)]
    fn test_random_run_is_balanced_and_complete(
        #[case] extra: &[&str],
        #[case] account_count: usize,
    ) {
        let mut flags = vec!["--strategy", "random", "--seed", "99", "--transactions-per-account", "4"];
        flags.extend_from_slice(extra);
        let args = parse(&flags);

        let mut output = Vec::new();
        let outcome = run_simulation(&args, &mut output).unwrap();

        assert_eq!(outcome.transactions.len(), account_count * 4);
        assert_eq!(outcome.transaction_errors, 0);
        for transaction in &outcome.transactions {
            let total = |kind: OperationType| -> Decimal {
                transaction
                    .operations
                    .iter()
                    .filter(|op| op.operation_type == kind)
                    .map(|op| op.amount.value)
                    .sum()
            };
            assert_eq!(total(OperationType::Debit), total(OperationType::Credit));
            assert!(transaction
                .operations
                .iter()
                .all(|op| op.amount.asset_code == transaction.asset_code));
        }
        assert_eq!(project(&String::from_utf8(output).unwrap()).len(), account_count * 4);
    }

    #[test]
    fn test_single_account_produces_empty_output() {
        let args = parse(&["--account-count", "1"]);

        let mut output = Vec::new();
        let outcome = run_simulation(&args, &mut output).unwrap();

        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.transaction_errors, 1);
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "id,asset_code,amount,source,target,description\n"
        );
    }

    #[test]
    fn test_missing_account_list_is_an_error() {
        let args = parse(&["--accounts", "tests/fixtures/does_not_exist.csv"]);

        let result = run_simulation(&args, &mut Vec::new());

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_breaker_isolates_a_downed_ledger() {
        let args = parse(&[
            "--account-count",
            "4",
            "--assets",
            "USD",
            "--transactions-per-account",
            "2",
            "--max-concurrency",
            "1",
            "--max-retries",
            "0",
            "--failure-threshold",
            "2",
            "--recovery-timeout-ms",
            "600000",
        ]);
        let entries = load_accounts(&args).unwrap();
        let ledger: Arc<InMemoryLedger> = Arc::new(build_ledger(&args, &entries, "BRL"));
        ledger.fail_always(LedgerError::upstream(503, "ledger unavailable"));

        let outcome = simulate(&args, &entries, Arc::clone(&ledger)).await;

        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.breaker.state, CircuitState::Open);
        // Only the calls that tripped the breaker reached the ledger
        assert_eq!(ledger.create_calls(), 2);
        // Deposits: the 503 and the open circuit; transfers: the open circuit
        assert_eq!(outcome.transaction_errors, 3);
        assert_eq!(outcome.transactions_created, 0);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_to_success() {
        let args = parse(&["--account-count", "3", "--transactions-per-account", "2"]);
        let entries = load_accounts(&args).unwrap();
        let ledger = Arc::new(build_ledger(&args, &entries, "BRL"));
        ledger.fail_next(2, LedgerError::transport("connection reset"));

        let outcome = simulate(&args, &entries, Arc::clone(&ledger)).await;

        assert_eq!(outcome.transactions.len(), 6);
        assert_eq!(outcome.transaction_errors, 0);
        assert_eq!(outcome.breaker.state, CircuitState::Closed);
    }
}
