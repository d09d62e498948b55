//! Table extraction from MinerU markdown output.
//!
//! MinerU renders statement tables either as inline HTML
//! (`<table><tr><td>..`) or, for simple layouts, as pipe tables:
//!
//!   <table><tr><td>Date</td><td>Details</td><td>Withdrawn</td><td>Paid In</td><td>Balance</td></tr>
//!   <tr><td>05JAN24</td><td>POS TESCO</td><td>12.40</td><td></td><td>987.60</td></tr></table>
//!
//!   | Date | Description | Amount | Balance |
//!   |------|-------------|--------|---------|
//!   | 2024-01-05 | Coffee Shop | -4.50 | 1000.00 |
//!
//! A table only counts as a transaction table once a row matching the active
//! profile's header marker has been seen; everything before it is ignored.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::types::{ExtractedStatement, RawPeriod, RawRow};

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no transaction table found in {0}")]
    NoTable(PathBuf),

    #[error("invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid html selector: {0}")]
    Selector(String),
}

/// Header cells identifying a transaction table, compared case-insensitively
/// with whitespace collapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMarker {
    header: Vec<String>,
}

impl TableMarker {
    pub fn new<I, S>(header: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            header: header
                .into_iter()
                .map(|h| collapse_whitespace(h.as_ref()).to_lowercase())
                .collect(),
        }
    }

    /// Number of columns a data row must have.
    pub fn width(&self) -> usize {
        self.header.len()
    }

    pub fn matches(&self, cells: &[String]) -> bool {
        !self.header.is_empty()
            && cells.len() >= self.header.len()
            && self
                .header
                .iter()
                .zip(cells)
                .all(|(h, c)| *h == c.to_lowercase())
    }
}

struct Patterns {
    table: Regex,
    period: Regex,
    row: Selector,
}

impl Patterns {
    fn compile() -> Result<Self, ExtractError> {
        Ok(Self {
            table: Regex::new(r"(?is)<table[^>]*>.*?</table>")?,
            period: Regex::new(concat!(
                r"(?im)statement\s+period\s*:?\s*(?:from\s+)?",
                r"(?P<from>\S.*?)\s+(?:to|-|–)\s+(?P<to>\S.*?)\s*$"
            ))?,
            row: Selector::parse("tr").map_err(|e| ExtractError::Selector(format!("{e:?}")))?,
        })
    }

    /// Rows of one HTML table, each as its `td`/`th` texts.
    fn html_rows(&self, table: &str) -> Vec<Vec<String>> {
        let doc = Html::parse_fragment(table);
        doc.select(&self.row)
            .map(|tr| {
                tr.children()
                    .filter_map(ElementRef::wrap)
                    .filter(|cell| {
                        let name = cell.value().name();
                        name.eq_ignore_ascii_case("td") || name.eq_ignore_ascii_case("th")
                    })
                    .map(|cell| collapse_whitespace(&cell.text().collect::<Vec<_>>().join(" ")))
                    .collect()
            })
            .collect()
    }
}

/// Plain text of an HTML snippet: tags dropped, entities decoded.
fn html_text(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    collapse_whitespace(&fragment.root_element().text().collect::<Vec<_>>().join(" "))
}

/// Recursively list `*.md` files under `dir`, sorted by path.
///
/// Symlinks are not followed. Unreadable entries below `dir` are logged and
/// skipped; an unreadable `dir` itself is an error.
pub fn discover_markdowns(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 => {
                tracing::warn!("skipping unreadable entry under {}: {e}", dir.display());
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        if entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
        {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}

/// Extract transaction rows from a single markdown file.
pub fn extract_file(path: &Path, marker: &TableMarker) -> Result<ExtractedStatement, ExtractError> {
    let patterns = Patterns::compile()?;
    extract_with(&patterns, path, marker)
}

fn extract_with(
    patterns: &Patterns,
    path: &Path,
    marker: &TableMarker,
) -> Result<ExtractedStatement, ExtractError> {
    let bytes = fs::read(path).map_err(|source| ExtractError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8_lossy(&bytes);
    extract_text(patterns, &text, path, marker)
}

fn extract_text(
    patterns: &Patterns,
    text: &str,
    source: &Path,
    marker: &TableMarker,
) -> Result<ExtractedStatement, ExtractError> {
    let tables = locate_tables(patterns, text);

    let mut rows = Vec::new();
    let mut row_index = 0;
    let mut found_table = false;

    for (table_index, table) in tables.iter().enumerate() {
        let mut header_seen = false;

        for cells in table {
            row_index += 1;

            if cells.iter().all(|c| c.is_empty()) || is_separator(cells) {
                continue;
            }

            if marker.matches(cells) {
                // Tables continued across pages repeat the header row.
                header_seen = true;
                found_table = true;
                continue;
            }
            if !header_seen {
                continue;
            }

            if cells.len() < marker.width() {
                tracing::debug!(
                    "{} row {}: {} cells, expected {}",
                    source.display(),
                    row_index,
                    cells.len(),
                    marker.width()
                );
                continue;
            }

            rows.push(RawRow {
                source: source.to_path_buf(),
                table_index,
                row_index,
                cells: cells[..marker.width()].to_vec(),
            });
        }
    }

    if !found_table {
        return Err(ExtractError::NoTable(source.to_path_buf()));
    }

    Ok(ExtractedStatement {
        source: source.to_path_buf(),
        period: find_period(patterns, text),
        rows,
    })
}

/// All tables in document order, each as a list of cleaned rows.
fn locate_tables(patterns: &Patterns, text: &str) -> Vec<Vec<Vec<String>>> {
    let mut blocks: Vec<(usize, Vec<Vec<String>>)> = Vec::new();
    let mut html_spans = Vec::new();

    for m in patterns.table.find_iter(text) {
        html_spans.push(m.range());
        blocks.push((m.start(), patterns.html_rows(m.as_str())));
    }

    let mut offset = 0;
    let mut current: Option<(usize, Vec<Vec<String>>)> = None;
    for line in text.split_inclusive('\n') {
        let start = offset;
        offset += line.len();

        let trimmed = line.trim();
        let in_html = html_spans.iter().any(|span| span.contains(&start));
        if !in_html && trimmed.starts_with('|') {
            let cells = split_pipe_row(trimmed)
                .into_iter()
                .map(html_text)
                .collect();
            current.get_or_insert_with(|| (start, Vec::new())).1.push(cells);
        } else if let Some(block) = current.take() {
            blocks.push(block);
        }
    }
    if let Some(block) = current {
        blocks.push(block);
    }

    blocks.sort_by_key(|(start, _)| *start);
    blocks.into_iter().map(|(_, rows)| rows).collect()
}

fn split_pipe_row(line: &str) -> Vec<&str> {
    let inner = line.strip_prefix('|').unwrap_or(line);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').collect()
}

fn is_separator(cells: &[String]) -> bool {
    cells.iter().all(|c| {
        let c = c.trim_matches(':');
        !c.is_empty() && c.chars().all(|ch| ch == '-')
    })
}

fn find_period(patterns: &Patterns, text: &str) -> Option<RawPeriod> {
    let fragment = Html::parse_fragment(text);
    let plain = fragment.root_element().text().collect::<Vec<_>>().join("\n");
    let caps = patterns.period.captures(&plain)?;
    Some(RawPeriod {
        from: collapse_whitespace(&caps["from"]),
        to: collapse_whitespace(&caps["to"]),
    })
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lazily walks a MinerU output directory, one markdown file per step.
///
/// Files that cannot be read or contain no transaction table are logged and
/// yielded as statements with zero rows, so one bad file never ends the batch.
pub struct StatementFiles {
    files: std::vec::IntoIter<PathBuf>,
    marker: TableMarker,
    patterns: Patterns,
}

impl StatementFiles {
    pub fn open(dir: &Path, marker: TableMarker) -> Result<Self, ExtractError> {
        let files = discover_markdowns(dir).map_err(|source| ExtractError::Read {
            path: dir.to_path_buf(),
            source,
        })?;
        Self::from_files(files, marker)
    }

    pub fn from_files(files: Vec<PathBuf>, marker: TableMarker) -> Result<Self, ExtractError> {
        Ok(Self {
            files: files.into_iter(),
            marker,
            patterns: Patterns::compile()?,
        })
    }

    /// Number of files not yet visited.
    pub fn remaining(&self) -> usize {
        self.files.len()
    }

    /// Flatten into the raw rows of every file.
    pub fn rows(self) -> impl Iterator<Item = RawRow> {
        self.flat_map(|stmt| stmt.rows)
    }
}

impl Iterator for StatementFiles {
    type Item = ExtractedStatement;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.files.next()?;
        match extract_with(&self.patterns, &path, &self.marker) {
            Ok(stmt) => {
                tracing::debug!("{}: {} rows", path.display(), stmt.rows.len());
                Some(stmt)
            }
            Err(e) => {
                tracing::warn!("skipping {}: {e}", path.display());
                Some(ExtractedStatement {
                    source: path,
                    period: None,
                    rows: Vec::new(),
                })
            }
        }
    }
}
