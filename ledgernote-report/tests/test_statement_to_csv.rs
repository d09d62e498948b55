use ledgernote_core::{MonthlyReport, Transaction, aggregate};
use ledgernote_ingest::{ProfileRegistry, StatementFiles, normalize_statement};
use ledgernote_report::csv_export::ALL_TRANSACTIONS_FILE;
use ledgernote_report::{CsvOptions, export_csv_files, read_transactions_csv};
use rust_decimal::Decimal;
use std::fs;
use std::path::Path;

const JANUARY: &str = r#"
# Current account statement
Statement period: 01JAN24 to 31JAN24

<table>
<tr><td>Date</td><td>Details</td><td>Withdrawn</td><td>Paid In</td><td>Balance</td></tr>
<tr><td>05JAN24</td><td>Coffee Shop</td><td>4.50</td><td></td><td>1,000.00</td></tr>
<tr><td>05JAN24</td><td>Salary</td><td></td><td>2,000.00</td><td>3,000.00</td></tr>
<tr><td>5?JAN24</td><td>Smudged</td><td>1.00</td><td></td><td>2,999.00</td></tr>
<tr><td>05JAN24</td><td>Salary</td><td></td><td>2,000.00</td><td>3,000.00</td></tr>
</table>
"#;

const FEBRUARY: &str = r#"
<table>
<tr><td>Date</td><td>Details</td><td>Withdrawn</td><td>Paid In</td><td>Balance</td></tr>
<tr><td>01FEB24</td><td>RENT FEB</td><td>1,200.00</td><td></td><td>1,800.00</td></tr>
<tr><td>14FEB24</td><td>TESCO STORES</td><td>56.12</td><td></td><td>1,743.88</td></tr>
</table>
"#;

fn load(dir: &Path) -> MonthlyReport {
    let registry = ProfileRegistry::builtin();
    let ptsb = registry.get("ptsb").unwrap();

    let txns: Vec<Transaction> = StatementFiles::open(dir, ptsb.marker().clone())
        .unwrap()
        .flat_map(|stmt| normalize_statement(&stmt, ptsb).transactions)
        .collect();
    aggregate(txns)
}

fn statements() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("feb")).unwrap();
    fs::write(dir.path().join("jan.md"), JANUARY).unwrap();
    fs::write(dir.path().join("feb").join("feb.md"), FEBRUARY).unwrap();
    fs::write(dir.path().join("notes.txt"), "not a statement").unwrap();
    dir
}

#[test]
fn test_statements_export_to_monthly_csv() {
    let input = statements();
    let out = tempfile::tempdir().unwrap();

    let report = load(input.path());
    assert_eq!(report.len(), 2);
    assert_eq!(report.transaction_count(), 4);

    let exports = export_csv_files(&report, out.path(), CsvOptions::default()).unwrap();
    let names: Vec<_> = exports
        .monthly
        .iter()
        .map(|(_, p)| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["2024.01.csv", "2024.02.csv"]);

    let jan = fs::read_to_string(out.path().join("2024.01.csv")).unwrap();
    assert_eq!(
        jan,
        "date,description,amount,direction,balance\n\
         2024-01-05,Coffee Shop,4.50,debit,1000.00\n\
         2024-01-05,Salary,2000.00,credit,3000.00\n"
    );
}

#[test]
fn test_csv_net_matches_buckets() {
    let input = statements();
    let out = tempfile::tempdir().unwrap();
    let report = load(input.path());
    export_csv_files(&report, out.path(), CsvOptions::default()).unwrap();

    let reread = read_transactions_csv(&out.path().join(ALL_TRANSACTIONS_FILE)).unwrap();
    let csv_net: Decimal = reread.iter().map(Transaction::signed_amount).sum();
    let bucket_net: Decimal = report.buckets().map(|b| b.net()).sum();
    assert_eq!(csv_net, bucket_net);
    assert_eq!(csv_net, Decimal::new(73938, 2));
}

#[test]
fn test_second_run_is_byte_identical() {
    let input = statements();
    let out = tempfile::tempdir().unwrap();

    export_csv_files(&load(input.path()), out.path(), CsvOptions::default()).unwrap();
    let first: Vec<Vec<u8>> = ["2024.01.csv", "2024.02.csv", ALL_TRANSACTIONS_FILE]
        .iter()
        .map(|f| fs::read(out.path().join(f)).unwrap())
        .collect();

    export_csv_files(&load(input.path()), out.path(), CsvOptions::default()).unwrap();
    let second: Vec<Vec<u8>> = ["2024.01.csv", "2024.02.csv", ALL_TRANSACTIONS_FILE]
        .iter()
        .map(|f| fs::read(out.path().join(f)).unwrap())
        .collect();

    assert_eq!(first, second);
}
