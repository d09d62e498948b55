//! Markdown → transactions → monthly report → files on disk.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ledgernote_core::{MonthKey, MonthlyReport, Transaction, aggregate};
use ledgernote_ingest::{BankFormatProfile, StatementFiles, normalize_statement};
use ledgernote_report::csv_export::ALL_TRANSACTIONS_FILE;
use ledgernote_report::{
    ChartPaths, CsvExports, CsvOptions, Destination, HtmlOptions, chart_paths, export_csv_files,
    export_workbook, read_transactions_csv, render_month_charts, render_report, write_preview,
};

use crate::config::{Config, ConfigError};

/// Inclusive `--start-date` / `--end-date` filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn parse(start: Option<&str>, end: Option<&str>) -> Result<Self, ConfigError> {
        let parse = |flag: &'static str, value: Option<&str>| {
            value
                .map(|v| {
                    NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").map_err(|_| {
                        ConfigError::InvalidDate {
                            flag,
                            value: v.to_string(),
                        }
                    })
                })
                .transpose()
        };
        let range = Self {
            start: parse("--start-date", start)?,
            end: parse("--end-date", end)?,
        };
        if let (Some(s), Some(e)) = (range.start, range.end) {
            if s > e {
                return Err(ConfigError::InvertedDateRange {
                    start: s.to_string(),
                    end: e.to_string(),
                });
            }
        }
        Ok(range)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

/// Extract and normalize every statement under `markdown_dir`.
pub fn load_statements(markdown_dir: &Path, profile: &BankFormatProfile) -> Result<Vec<Transaction>> {
    if !markdown_dir.is_dir() {
        return Err(ConfigError::MissingDirectory {
            what: "markdown directory",
            path: markdown_dir.to_path_buf(),
        }
        .into());
    }

    let files = StatementFiles::open(markdown_dir, profile.marker().clone())
        .with_context(|| format!("scan {}", markdown_dir.display()))?;
    tracing::info!("reading {} markdown file(s) from {}", files.remaining(), markdown_dir.display());

    let mut transactions = Vec::new();
    for stmt in files {
        let normalized = normalize_statement(&stmt, profile);
        tracing::info!(
            "{}: {} transactions, {} rejected, {} duplicates",
            normalized.source.display(),
            normalized.transactions.len(),
            normalized.rejected.len(),
            normalized.duplicates
        );
        transactions.extend(normalized.transactions);
    }
    Ok(transactions)
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub export_dir: PathBuf,
    pub charts: bool,
    pub excel: bool,
    pub csv: CsvOptions,
    pub html: HtmlOptions,
    pub destination: Destination,
}

impl ExportSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            export_dir: cfg.paths.export_dir.clone(),
            charts: cfg.reports.charts_enabled,
            excel: cfg.reports.excel_enabled,
            csv: CsvOptions {
                utf8_bom: cfg.reports.csv_utf8_bom,
            },
            html: HtmlOptions {
                monthly_table: cfg.reports.monthly_table_enabled,
            },
            destination: Destination {
                notebook: cfg.onenote.notebook_name.clone(),
                section: cfg.onenote.section_name.clone(),
                page_title: cfg.onenote.page_title.clone(),
            },
        }
    }
}

pub struct ExportOutcome {
    pub report: MonthlyReport,
    pub csv: CsvExports,
    pub charts: BTreeMap<MonthKey, ChartPaths>,
    pub workbook: Option<PathBuf>,
    pub preview: PathBuf,
}

/// Filter, aggregate and write CSV, charts and the HTML preview.
pub fn export_report(
    transactions: Vec<Transaction>,
    range: &DateRange,
    settings: &ExportSettings,
) -> Result<ExportOutcome> {
    let total = transactions.len();
    let kept: Vec<Transaction> = transactions
        .into_iter()
        .filter(|t| range.contains(t.date))
        .collect();
    if kept.len() < total {
        tracing::info!("date filter kept {} of {} transactions", kept.len(), total);
    }

    let report = aggregate(kept);
    let csv = export_csv_files(&report, &settings.export_dir, settings.csv)?;
    let workbook = if settings.excel {
        Some(export_workbook(&report, &settings.export_dir)?)
    } else {
        None
    };
    let charts = if settings.charts {
        render_charts(&report, &settings.export_dir)
    } else {
        BTreeMap::new()
    };
    let preview = write_preview(
        &settings.export_dir,
        &render_report(report.buckets(), &charts, &settings.destination, settings.html),
    )?;

    Ok(ExportOutcome {
        report,
        csv,
        charts,
        workbook,
        preview,
    })
}

fn render_charts(report: &MonthlyReport, export_dir: &Path) -> BTreeMap<MonthKey, ChartPaths> {
    let mut out = BTreeMap::new();
    for bucket in report.buckets() {
        match render_month_charts(bucket, export_dir) {
            Ok(paths) => {
                out.insert(bucket.key(), paths);
            }
            Err(e) => tracing::warn!("charts for {} skipped: {e:#}", bucket.key()),
        }
    }
    out
}

/// Rebuild the report from a previous export's `all_transactions.csv`,
/// picking up chart images that are already on disk.
pub fn load_exported(settings: &ExportSettings) -> Result<(MonthlyReport, BTreeMap<MonthKey, ChartPaths>)> {
    let csv = settings.export_dir.join(ALL_TRANSACTIONS_FILE);
    if !csv.is_file() {
        bail!("{} not found; run `ledgernote export` first", csv.display());
    }
    let report = aggregate(read_transactions_csv(&csv)?);

    let mut charts = BTreeMap::new();
    if settings.charts {
        for bucket in report.buckets() {
            let paths = chart_paths(&settings.export_dir, bucket.key());
            if paths.income_vs_spending.is_file() && paths.daily_income_spending.is_file() {
                charts.insert(bucket.key(), paths);
            }
        }
    }
    Ok((report, charts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgernote_core::Direction;
    use ledgernote_ingest::ProfileRegistry;
    use rust_decimal::Decimal;
    use std::fs;

    fn txn(month: u32, day: u32, cents: i64, direction: Direction) -> Transaction {
        Transaction {
            date: NaiveDate::from_ymd_opt(2024, month, day).unwrap(),
            description: "Payment".to_string(),
            amount: Decimal::new(cents, 2),
            direction,
            balance_after: None,
            source_bank_format: "ptsb".to_string(),
            source_file: "s.md".to_string(),
            source_row: 1,
        }
    }

    fn settings(dir: &Path) -> ExportSettings {
        let mut cfg = Config::default();
        cfg.paths.export_dir = dir.to_path_buf();
        cfg.reports.charts_enabled = false;
        ExportSettings::from_config(&cfg)
    }

    #[test]
    fn test_date_range() {
        let range = DateRange::parse(Some("2024-01-10"), Some("2024-01-31")).unwrap();
        assert!(!range.contains(NaiveDate::from_ymd_opt(2024, 1, 9).unwrap()));
        assert!(range.contains(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap()));
        assert!(range.contains(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()));
        assert!(!range.contains(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()));

        assert!(DateRange::parse(None, None).unwrap().contains(NaiveDate::MIN));
        assert!(matches!(
            DateRange::parse(Some("01/10/2024"), None),
            Err(ConfigError::InvalidDate { flag: "--start-date", .. })
        ));
        assert!(matches!(
            DateRange::parse(Some("2024-02-01"), Some("2024-01-01")),
            Err(ConfigError::InvertedDateRange { .. })
        ));
    }

    #[test]
    fn test_export_writes_all_local_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = export_report(
            vec![
                txn(1, 5, 200000, Direction::Credit),
                txn(1, 6, 450, Direction::Debit),
                txn(2, 1, 120000, Direction::Debit),
            ],
            &DateRange::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap(),
            &settings(dir.path()),
        )
        .unwrap();

        assert_eq!(outcome.report.len(), 1);
        assert_eq!(outcome.csv.monthly.len(), 1);
        assert!(outcome.charts.is_empty());
        assert!(outcome.workbook.is_none());
        assert!(dir.path().join("2024.01.csv").is_file());
        assert!(!dir.path().join("2024.02.csv").exists());

        let preview = fs::read_to_string(&outcome.preview).unwrap();
        assert!(preview.contains("<td>Net</td><td>1995.50</td>"));
    }

    #[test]
    fn test_excel_workbook_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.excel = true;

        let outcome = export_report(vec![txn(1, 5, 450, Direction::Debit)], &DateRange::default(), &settings).unwrap();
        let workbook = outcome.workbook.unwrap();
        assert_eq!(workbook, dir.path().join("monthly_transactions.xlsx"));
        assert!(workbook.is_file());
    }

    #[test]
    fn test_narrower_rerun_drops_stale_months() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        let txns = vec![txn(1, 5, 450, Direction::Debit), txn(2, 1, 120000, Direction::Debit)];

        export_report(txns.clone(), &DateRange::default(), &settings).unwrap();
        assert!(dir.path().join("2024.02.csv").is_file());

        let january = DateRange::parse(Some("2024-01-01"), Some("2024-01-31")).unwrap();
        export_report(txns, &january, &settings).unwrap();
        assert!(!dir.path().join("2024.02.csv").exists());

        let (report, _) = load_exported(&settings).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report.transaction_count(), 1);
    }

    #[test]
    fn test_load_exported_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        assert!(load_exported(&settings).is_err());

        let outcome = export_report(
            vec![txn(3, 2, 5000, Direction::Debit), txn(4, 2, 7000, Direction::Credit)],
            &DateRange::default(),
            &settings,
        )
        .unwrap();
        let (report, charts) = load_exported(&settings).unwrap();
        assert_eq!(report.net(), outcome.report.net());
        assert_eq!(report.len(), 2);
        assert!(charts.is_empty());
    }

    #[test]
    fn test_missing_markdown_dir_is_config_error() {
        let registry = ProfileRegistry::builtin();
        let err = load_statements(Path::new("/definitely/not/here"), registry.get("ptsb").unwrap())
            .unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_load_statements_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "no tables here").unwrap();
        fs::write(
            dir.path().join("b.md"),
            "| Date | Details | Withdrawn | Paid In | Balance |\n|---|---|---|---|---|\n| 05JAN24 | Coffee Shop | 4.50 | | 1,000.00 |\n",
        )
        .unwrap();

        let registry = ProfileRegistry::builtin();
        let txns = load_statements(dir.path(), registry.get("ptsb").unwrap()).unwrap();
        assert_eq!(txns.len(), 1);
        assert_eq!(txns[0].amount, Decimal::new(450, 2));
    }
}
