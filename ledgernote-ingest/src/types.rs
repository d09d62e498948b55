use std::path::PathBuf;

/// One table row as it appeared in the markdown, cells already cleaned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// Markdown file the row came from
    pub source: PathBuf,
    /// Index of the table within the file (all tables counted, document order)
    pub table_index: usize,
    /// Row ordinal within the file (all table rows counted, document order)
    pub row_index: usize,
    pub cells: Vec<String>,
}

impl RawRow {
    pub fn cell(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }

    pub fn source_name(&self) -> String {
        self.source.display().to_string()
    }
}

/// Statement period as printed in the document, not yet parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPeriod {
    pub from: String,
    pub to: String,
}

/// Everything pulled out of one markdown file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedStatement {
    pub source: PathBuf,
    pub period: Option<RawPeriod>,
    pub rows: Vec<RawRow>,
}
