//! HTML preview of the monthly report.
//!
//! The report lives in a managed block between [`START_MARKER`] and
//! [`END_MARKER`] so it can be regenerated in place without touching
//! anything else in the preview file. The same markup is what gets synced
//! to OneNote, where the outer `div` is addressed by its `data-id`.

use anyhow::{Context, Result};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ledgernote_core::{MonthKey, MonthlyBucket, format_amount, format_optional_amount};

use crate::charts::ChartPaths;

pub const START_MARKER: &str = "<!-- LEDGERNOTE:START -->";
pub const END_MARKER: &str = "<!-- LEDGERNOTE:END -->";
/// `data-id` of the report element, used as the OneNote PATCH target
pub const REPORT_ELEMENT_ID: &str = "ledgernote-report";
pub const PREVIEW_FILE: &str = "onenote_sync_preview.html";

/// Where the report is meant to end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub notebook: String,
    pub section: String,
    pub page_title: String,
}

impl Destination {
    pub fn describe(&self) -> String {
        format!("{} / {} / {}", self.notebook, self.section, self.page_title)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HtmlOptions {
    pub monthly_table: bool,
}

impl Default for HtmlOptions {
    fn default() -> Self {
        Self { monthly_table: true }
    }
}

/// The report element: title, destination and one section per bucket.
pub fn render_report<'a>(
    buckets: impl IntoIterator<Item = &'a MonthlyBucket>,
    charts: &BTreeMap<MonthKey, ChartPaths>,
    destination: &Destination,
    options: HtmlOptions,
) -> Markup {
    html! {
        div data-id=(REPORT_ELEMENT_ID) id=(REPORT_ELEMENT_ID) {
            h1 { (destination.page_title) }
            p { "Destination: " (destination.describe()) }
            @for bucket in buckets {
                (render_month_section(bucket, charts.get(&bucket.key()), options))
            }
        }
    }
}

pub fn render_month_section(
    bucket: &MonthlyBucket,
    charts: Option<&ChartPaths>,
    options: HtmlOptions,
) -> Markup {
    html! {
        h2 { (bucket.key()) }
        @if options.monthly_table {
            table border="1" cellpadding="4" cellspacing="0" {
                tr {
                    th { "Date" }
                    th { "Description" }
                    th { "Amount" }
                    th { "Direction" }
                    th { "Balance" }
                }
                @for t in bucket.transactions() {
                    tr {
                        td { (t.date.format("%Y-%m-%d")) }
                        td { (t.description) }
                        td { (format_amount(t.amount)) }
                        td { (t.direction) }
                        td { (format_optional_amount(t.balance_after)) }
                    }
                }
            }
        }
        @if let Some(charts) = charts {
            p {
                img src=(image_src(&charts.income_vs_spending)) alt={ "Income vs spending " (bucket.key()) };
            }
            p {
                img src=(image_src(&charts.daily_income_spending)) alt={ "Daily income and spending " (bucket.key()) };
            }
        }
        @let breakdown = bucket.spending_by_category();
        @if !breakdown.is_empty() {
            h3 { "Spending by category" }
            table border="1" cellpadding="4" cellspacing="0" {
                @for (category, total) in &breakdown {
                    tr {
                        td { (category) }
                        td { (format_amount(*total)) }
                    }
                }
            }
        }
        h3 { "Summary" }
        table border="1" cellpadding="4" cellspacing="0" {
            tr { td { "Total spending" } td { (format_amount(bucket.total_debits())) } }
            tr { td { "Total income" } td { (format_amount(bucket.total_credits())) } }
            tr { td { "Net" } td { (format_amount(bucket.net())) } }
        }
    }
}

fn image_src(path: &Path) -> String {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", absolute.display())
}

/// The report wrapped in start/end markers.
pub fn managed_block(report: &Markup) -> String {
    format!("{START_MARKER}\n{}\n{END_MARKER}", report.0)
}

/// A standalone page, as sent when creating a OneNote page.
pub fn page_document(title: &str, report: &Markup) -> String {
    html! {
        (DOCTYPE)
        html {
            head {
                title { (title) }
            }
            body { (PreEscaped(&report.0)) }
        }
    }
    .into_string()
}

/// Replace the managed block in `existing`, or append it when no block is present.
pub fn replace_managed_block(existing: &str, block: &str) -> String {
    if let Some(start) = existing.find(START_MARKER) {
        if let Some(rel_end) = existing[start..].find(END_MARKER) {
            let end = start + rel_end + END_MARKER.len();
            return format!("{}{}{}", &existing[..start], block, &existing[end..]);
        }
    }

    let head = existing.trim_end();
    if head.is_empty() {
        format!("{block}\n")
    } else {
        format!("{head}\n{block}\n")
    }
}

/// Write (or update) `onenote_sync_preview.html` in `export_dir`.
pub fn write_preview(export_dir: &Path, report: &Markup) -> Result<PathBuf> {
    fs::create_dir_all(export_dir).with_context(|| format!("create {}", export_dir.display()))?;
    let path = export_dir.join(PREVIEW_FILE);

    let existing = match fs::read_to_string(&path) {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e).with_context(|| format!("read {}", path.display())),
    };

    let updated = replace_managed_block(&existing, &managed_block(report));
    fs::write(&path, updated).with_context(|| format!("write {}", path.display()))?;
    tracing::info!("wrote {}", path.display());
    Ok(path)
}
