//! `monthly_transactions.xlsx`: one worksheet per month, same columns as the CSV.

use anyhow::{Context, Result};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use rust_xlsxwriter::{Format, Workbook};
use std::fs;
use std::path::{Path, PathBuf};

use ledgernote_core::{MonthlyBucket, MonthlyReport};

use crate::csv_export::CSV_COLUMNS;

pub const WORKBOOK_FILE: &str = "monthly_transactions.xlsx";

/// One worksheet row before it is written.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SheetRow {
    pub date: String,
    pub description: String,
    pub amount: f64,
    pub direction: &'static str,
    pub balance: Option<f64>,
}

pub(crate) fn sheet_rows(bucket: &MonthlyBucket) -> Vec<SheetRow> {
    bucket
        .transactions()
        .iter()
        .map(|t| SheetRow {
            date: t.date.format("%Y-%m-%d").to_string(),
            description: t.description.clone(),
            amount: to_f64(t.amount),
            direction: t.direction.as_str(),
            balance: t.balance_after.map(to_f64),
        })
        .collect()
}

fn to_f64(value: Decimal) -> f64 {
    value.round_dp(2).to_f64().unwrap_or_default()
}

/// Write the workbook into `export_dir`; sheets are named `YYYY.MM`.
pub fn export_workbook(report: &MonthlyReport, export_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(export_dir).with_context(|| format!("create {}", export_dir.display()))?;
    let path = export_dir.join(WORKBOOK_FILE);

    let header = Format::new().set_bold();
    let money = Format::new().set_num_format("0.00");
    let mut workbook = Workbook::new();

    for bucket in report.buckets() {
        let sheet = workbook.add_worksheet();
        sheet.set_name(bucket.key().to_string())?;

        for (col, name) in CSV_COLUMNS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *name, &header)?;
        }
        for (i, row) in sheet_rows(bucket).into_iter().enumerate() {
            let r = i as u32 + 1;
            sheet.write_string(r, 0, row.date)?;
            sheet.write_string(r, 1, row.description)?;
            sheet.write_number_with_format(r, 2, row.amount, &money)?;
            sheet.write_string(r, 3, row.direction)?;
            if let Some(balance) = row.balance {
                sheet.write_number_with_format(r, 4, balance, &money)?;
            }
        }
    }

    workbook
        .save(&path)
        .with_context(|| format!("write {}", path.display()))?;
    tracing::info!("wrote {} ({} sheet(s))", path.display(), report.len());
    Ok(path)
}
