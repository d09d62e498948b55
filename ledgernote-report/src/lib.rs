//! ledgernote-report: CSV, Excel, chart and HTML preview exporters for monthly buckets.
//!
//! Exporters only format. Every figure comes from the buckets computed by
//! `ledgernote_core::aggregate`.

pub mod charts;
pub mod csv_export;
pub mod excel;
pub mod html;

pub use charts::{ChartPaths, chart_paths, render_month_charts};
pub use csv_export::{CsvExports, CsvOptions, export_csv_files, read_transactions_csv};
pub use excel::export_workbook;
pub use html::{Destination, HtmlOptions, render_month_section, render_report, write_preview};
