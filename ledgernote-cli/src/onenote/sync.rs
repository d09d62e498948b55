//! Page upsert: find or create notebook and section, then update the page
//! titled like the destination in place, or create it the first time.

use maud::Markup;
use std::collections::BTreeMap;

use ledgernote_core::{MonthKey, MonthlyReport};
use ledgernote_report::html::{REPORT_ELEMENT_ID, page_document};
use ledgernote_report::{ChartPaths, Destination, HtmlOptions, render_report};

use super::SyncError;
use super::graph::{OneNoteApi, OneNoteItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedPage {
    pub id: String,
    pub title: String,
    pub created: bool,
    pub web_url: Option<String>,
}

fn find_by_name(items: Vec<OneNoteItem>, name: &str) -> Option<OneNoteItem> {
    let needle = name.trim().to_lowercase();
    items
        .into_iter()
        .find(|item| item.name.trim().to_lowercase() == needle)
}

fn find_or_create(
    existing: Vec<OneNoteItem>,
    name: &str,
    create: impl FnOnce() -> Result<OneNoteItem, SyncError>,
) -> Result<OneNoteItem, SyncError> {
    match find_by_name(existing, name) {
        Some(item) => Ok(item),
        None => {
            tracing::info!("creating '{name}'");
            create()
        }
    }
}

/// Put `report` on the page `title` in `notebook / section`.
pub fn upsert_page(
    api: &dyn OneNoteApi,
    notebook: &str,
    section: &str,
    title: &str,
    report: &Markup,
) -> Result<SyncedPage, SyncError> {
    let nb = find_or_create(api.list_notebooks()?, notebook, || api.create_notebook(notebook))?;
    let sec = find_or_create(api.list_sections(&nb.id)?, section, || {
        api.create_section(&nb.id, section)
    })?;

    match find_by_name(api.list_pages(&sec.id)?, title) {
        Some(page) => {
            api.replace_element(&page.id, REPORT_ELEMENT_ID, &report.0)?;
            tracing::info!("updated OneNote page '{title}'");
            Ok(SyncedPage {
                id: page.id,
                title: title.to_string(),
                created: false,
                web_url: page.web_url,
            })
        }
        None => {
            let page = api.create_page(&sec.id, &page_document(title, report))?;
            tracing::info!("created OneNote page '{title}'");
            Ok(SyncedPage {
                id: page.id,
                title: title.to_string(),
                created: true,
                web_url: page.web_url,
            })
        }
    }
}

/// Sync the whole report to one page, or one page per month titled
/// `<page title> YYYY.MM`.
pub fn sync_report(
    api: &dyn OneNoteApi,
    report: &MonthlyReport,
    charts: &BTreeMap<MonthKey, ChartPaths>,
    destination: &Destination,
    options: HtmlOptions,
    page_per_month: bool,
) -> Result<Vec<SyncedPage>, SyncError> {
    if !page_per_month {
        let markup = render_report(report.buckets(), charts, destination, options);
        let page = upsert_page(
            api,
            &destination.notebook,
            &destination.section,
            &destination.page_title,
            &markup,
        )?;
        return Ok(vec![page]);
    }

    report
        .buckets()
        .map(|bucket| {
            let month = Destination {
                page_title: format!("{} {}", destination.page_title, bucket.key()),
                ..destination.clone()
            };
            let markup = render_report(std::iter::once(bucket), charts, &month, options);
            upsert_page(api, &month.notebook, &month.section, &month.page_title, &markup)
        })
        .collect()
}
