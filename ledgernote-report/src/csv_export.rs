//! Monthly and combined CSV files.
//!
//! Column order is fixed: date, description, amount, direction, balance.
//! Output is a pure function of the report, so re-running an export over the
//! same statements rewrites byte-identical files.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ledgernote_core::{
    Direction, MonthKey, MonthlyReport, Transaction, format_amount, format_optional_amount,
};

pub const CSV_COLUMNS: [&str; 5] = ["date", "description", "amount", "direction", "balance"];
pub const ALL_TRANSACTIONS_FILE: &str = "all_transactions.csv";
/// `source_bank_format` given to transactions read back from an export
pub const EXPORT_FORMAT_ID: &str = "export";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsvOptions {
    /// Prefix files with a UTF-8 byte order mark (for Excel)
    pub utf8_bom: bool,
}

/// Paths written by [`export_csv_files`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExports {
    pub monthly: Vec<(MonthKey, PathBuf)>,
    pub combined: PathBuf,
}

pub fn month_csv_path(export_dir: &Path, key: MonthKey) -> PathBuf {
    export_dir.join(format!("{key}.csv"))
}

/// Write `YYYY.MM.csv` per bucket and `all_transactions.csv`.
pub fn export_csv_files(report: &MonthlyReport, export_dir: &Path, options: CsvOptions) -> Result<CsvExports> {
    fs::create_dir_all(export_dir).with_context(|| format!("create {}", export_dir.display()))?;

    let mut monthly = Vec::with_capacity(report.len());
    for bucket in report.buckets() {
        let path = month_csv_path(export_dir, bucket.key());
        write_csv(&path, bucket.transactions().iter(), options)?;
        tracing::info!("wrote {} ({} rows)", path.display(), bucket.count());
        monthly.push((bucket.key(), path));
    }

    let combined = export_dir.join(ALL_TRANSACTIONS_FILE);
    write_csv(&combined, report.all_transactions(), options)?;
    tracing::info!("wrote {} ({} rows)", combined.display(), report.transaction_count());

    remove_stale_months(report, export_dir)?;
    Ok(CsvExports { monthly, combined })
}

/// Month files from an earlier, wider run; anything not named exactly
/// `YYYY.MM.csv` is left alone.
fn remove_stale_months(report: &MonthlyReport, export_dir: &Path) -> Result<()> {
    let entries = fs::read_dir(export_dir).with_context(|| format!("read {}", export_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() || path.extension().is_none_or(|ext| ext != "csv") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Ok(key) = MonthKey::from_str(stem) else {
            continue;
        };
        if key.to_string() != stem || report.get(key).is_some() {
            continue;
        }
        fs::remove_file(&path).with_context(|| format!("remove {}", path.display()))?;
        tracing::info!("removed stale {}", path.display());
    }
    Ok(())
}

fn write_csv<'a>(
    path: &Path,
    rows: impl Iterator<Item = &'a Transaction>,
    options: CsvOptions,
) -> Result<()> {
    let mut file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    if options.utf8_bom {
        file.write_all(UTF8_BOM)
            .with_context(|| format!("write {}", path.display()))?;
    }

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file);

    writer.write_record(CSV_COLUMNS)?;
    for t in rows {
        writer.write_record([
            t.date.format("%Y-%m-%d").to_string(),
            t.description.clone(),
            format_amount(t.amount),
            t.direction.to_string(),
            format_optional_amount(t.balance_after),
        ])?;
    }
    writer
        .flush()
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Read an exported CSV back into transactions, in file order.
pub fn read_transactions_csv(path: &Path) -> Result<Vec<Transaction>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let source_file = path.display().to_string();
    let mut out = Vec::new();

    for (i, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("reading {}", path.display()))?;
        let line = i + 2;
        let field = |idx: usize| record.get(idx).unwrap_or("").trim();

        let date = NaiveDate::parse_from_str(field(0), "%Y-%m-%d")
            .with_context(|| format!("{source_file}:{line}: bad date '{}'", field(0)))?;
        let amount = Decimal::from_str(field(2))
            .with_context(|| format!("{source_file}:{line}: bad amount '{}'", field(2)))?;
        if amount <= Decimal::ZERO {
            bail!("{source_file}:{line}: amount must be positive, got {amount}");
        }
        let direction = Direction::from_str(field(3))
            .map_err(|e| anyhow::anyhow!("{source_file}:{line}: {e}"))?;
        let balance_after = match field(4) {
            "" => None,
            raw => Some(
                Decimal::from_str(raw)
                    .with_context(|| format!("{source_file}:{line}: bad balance '{raw}'"))?,
            ),
        };

        out.push(Transaction {
            date,
            description: field(1).to_string(),
            amount,
            direction,
            balance_after,
            source_bank_format: EXPORT_FORMAT_ID.to_string(),
            source_file: source_file.clone(),
            source_row: line,
        });
    }

    Ok(out)
}
