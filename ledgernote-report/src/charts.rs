//! Per-month chart images.
//!
//! Two charts per bucket:
//! - **Income vs spending**: pie of the month's total credits and debits
//! - **Daily income/spending**: stacked bar over every day of the month
//!
//! Figures come straight from the bucket; this module only lays them out.
//! Rasterizing is done by charming's image renderer.

use anyhow::{Context, Result, anyhow};
use charming::{
    Chart, ImageFormat, ImageRenderer,
    component::{Axis, Grid, Legend, Title},
    element::{AxisType, Color, ItemStyle, Tooltip, Trigger},
    series::{Bar, Pie},
};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use std::fs;
use std::path::{Path, PathBuf};

use ledgernote_core::{MonthKey, MonthlyBucket};

pub const CHARTS_DIR: &str = "charts";

const INCOME_COLOR: &str = "#2e7d32";
const SPENDING_COLOR: &str = "#c62828";
const PIE_SIZE: (u32, u32) = (640, 480);
const BAR_SIZE: (u32, u32) = (1000, 480);

/// Image files for one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartPaths {
    pub income_vs_spending: PathBuf,
    pub daily_income_spending: PathBuf,
}

pub fn chart_paths(export_dir: &Path, key: MonthKey) -> ChartPaths {
    let dir = export_dir.join(CHARTS_DIR);
    ChartPaths {
        income_vs_spending: dir.join(format!("{key}_income_vs_spending.png")),
        daily_income_spending: dir.join(format!("{key}_daily_income_spending.png")),
    }
}

/// Render both charts for `bucket` under `export_dir/charts`.
pub fn render_month_charts(bucket: &MonthlyBucket, export_dir: &Path) -> Result<ChartPaths> {
    let paths = chart_paths(export_dir, bucket.key());
    let dir = export_dir.join(CHARTS_DIR);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

    save_png(&income_vs_spending_chart(bucket), PIE_SIZE, &paths.income_vs_spending)?;
    save_png(&daily_chart(bucket), BAR_SIZE, &paths.daily_income_spending)?;

    tracing::debug!("rendered charts for {}", bucket.key());
    Ok(paths)
}

fn save_png(chart: &Chart, (width, height): (u32, u32), path: &Path) -> Result<()> {
    let mut renderer = ImageRenderer::new(width, height);
    renderer
        .save_format(ImageFormat::Png, chart, path)
        .map_err(|e| anyhow!("render {}: {e:?}", path.display()))
}

pub(crate) fn income_vs_spending_chart(bucket: &MonthlyBucket) -> Chart {
    Chart::new()
        .title(Title::new().text(format!("Income vs spending {}", bucket.key())))
        .legend(Legend::new().bottom("2%"))
        .color::<Color>(vec![INCOME_COLOR.into(), SPENDING_COLOR.into()])
        .series(
            Pie::new()
                .name("Totals")
                .radius("60%")
                .data(pie_data(bucket)),
        )
}

pub(crate) fn pie_data(bucket: &MonthlyBucket) -> Vec<(f64, &'static str)> {
    vec![
        (to_f64(bucket.total_credits()), "Income"),
        (to_f64(bucket.total_debits()), "Spending"),
    ]
}

pub(crate) fn daily_chart(bucket: &MonthlyBucket) -> Chart {
    let (labels, income, spending) = daily_series(bucket);

    Chart::new()
        .title(Title::new().text(format!("Daily income and spending {}", bucket.key())))
        .tooltip(Tooltip::new().trigger(Trigger::Axis))
        .legend(Legend::new().top("1%").right("4%"))
        .grid(
            Grid::new()
                .left("3%")
                .right("4%")
                .bottom("3%")
                .contain_label(true),
        )
        .x_axis(Axis::new().type_(AxisType::Category).data(labels))
        .y_axis(Axis::new().type_(AxisType::Value))
        .series(
            Bar::new()
                .name("Income")
                .stack("daily")
                .item_style(ItemStyle::new().color(INCOME_COLOR))
                .data(income),
        )
        .series(
            Bar::new()
                .name("Spending")
                .stack("daily")
                .item_style(ItemStyle::new().color(SPENDING_COLOR))
                .data(spending),
        )
}

/// Day labels (`01`..`31`) with income and spending for each day.
pub(crate) fn daily_series(bucket: &MonthlyBucket) -> (Vec<String>, Vec<f64>, Vec<f64>) {
    let days = bucket.daily_totals();
    let labels = days.iter().map(|d| d.date.format("%d").to_string()).collect();
    let income = days.iter().map(|d| to_f64(d.credits)).collect();
    let spending = days.iter().map(|d| to_f64(d.debits)).collect();
    (labels, income, spending)
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or_default()
}
