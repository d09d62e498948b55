//! `config.toml`: paths, MinerU invocation, OneNote destination, report
//! toggles and the statement profile.
//!
//! Every key has a default, so a partial file (or a missing section) is
//! fine. Relative paths are resolved against the directory holding the
//! config file once overrides have been applied.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use ledgernote_ingest::{ProfileError, ProfileRegistry, ProfileSpec};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Profile(#[from] ProfileError),

    #[error("onenote.client_id is required for live OneNote sync")]
    MissingClientId,

    #[error("{what} not found: {path}")]
    MissingDirectory { what: &'static str, path: PathBuf },

    #[error("invalid {flag} '{value}' (expected YYYY-MM-DD)")]
    InvalidDate { flag: &'static str, value: String },

    #[error("--start-date {start} is after --end-date {end}")]
    InvertedDateRange { start: String, end: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsSection,
    pub mineru: MineruSection,
    pub onenote: OneNoteSection,
    pub reports: ReportsSection,
    pub statement: StatementSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub input_pdf_dir: PathBuf,
    /// MinerU markdown output, which is also the input of `export`
    pub mineru_output_dir: PathBuf,
    pub export_dir: PathBuf,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            input_pdf_dir: PathBuf::from("./pdf_report"),
            mineru_output_dir: PathBuf::from("./pdf_convert"),
            export_dir: PathBuf::from("./export"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MineruSection {
    /// Program plus leading arguments, split shell-style
    pub command: String,
    /// Arguments with `{input}` / `{output}` placeholders
    pub args: Vec<String>,
    pub recursive: bool,
}

impl Default for MineruSection {
    fn default() -> Self {
        Self {
            command: "mineru".to_string(),
            args: ["-p", "{input}", "-o", "{output}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            recursive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OneNoteSection {
    /// Produce the OneNote preview during `run`
    pub enabled: bool,
    /// Push the preview to Microsoft Graph
    pub graph_enabled: bool,
    pub notebook_name: String,
    pub section_name: String,
    pub page_title: String,
    pub page_per_month: bool,
    pub tenant: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub token_cache_file: PathBuf,
}

impl Default for OneNoteSection {
    fn default() -> Self {
        Self {
            enabled: false,
            graph_enabled: false,
            notebook_name: "Bank statements".to_string(),
            section_name: "Transactions".to_string(),
            page_title: "Monthly report".to_string(),
            page_per_month: false,
            tenant: "common".to_string(),
            client_id: String::new(),
            scopes: vec!["Notes.ReadWrite".to_string(), "offline_access".to_string()],
            token_cache_file: PathBuf::from("./.ledgernote_graph_token.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportsSection {
    pub charts_enabled: bool,
    pub monthly_table_enabled: bool,
    pub csv_utf8_bom: bool,
    /// Also write `monthly_transactions.xlsx`
    pub excel_enabled: bool,
}

impl Default for ReportsSection {
    fn default() -> Self {
        Self {
            charts_enabled: true,
            monthly_table_enabled: true,
            csv_utf8_bom: false,
            excel_enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatementSection {
    /// Bank format profile id
    pub profile: String,
    /// Extra profiles; an id matching a built-in replaces it
    pub profiles: Vec<ProfileSpec>,
}

impl Default for StatementSection {
    fn default() -> Self {
        Self {
            profile: "ptsb".to_string(),
            profiles: Vec::new(),
        }
    }
}

/// Command-line values that win over the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub input: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub export: Option<PathBuf>,
    pub page_title: Option<String>,
    pub notebook: Option<String>,
    pub section: Option<String>,
    pub onenote_live: bool,
    pub no_onenote: bool,
    pub csv_utf8_bom: bool,
    pub excel: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The file at `path`, or defaults when it does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply(&mut self, o: &Overrides) {
        if let Some(p) = &o.input {
            self.paths.input_pdf_dir = p.clone();
        }
        if let Some(p) = &o.out {
            self.paths.mineru_output_dir = p.clone();
        }
        if let Some(p) = &o.export {
            self.paths.export_dir = p.clone();
        }
        if let Some(t) = &o.page_title {
            self.onenote.page_title = t.clone();
        }
        if let Some(n) = &o.notebook {
            self.onenote.notebook_name = n.clone();
        }
        if let Some(s) = &o.section {
            self.onenote.section_name = s.clone();
        }
        if o.onenote_live {
            self.onenote.graph_enabled = true;
        }
        if o.no_onenote {
            self.onenote.enabled = false;
            self.onenote.graph_enabled = false;
        }
        if o.csv_utf8_bom {
            self.reports.csv_utf8_bom = true;
        }
        if o.excel {
            self.reports.excel_enabled = true;
        }
    }

    /// Make every configured path absolute, relative to `base_dir`.
    pub fn resolve_paths(&mut self, base_dir: &Path) {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        let resolve = |p: &Path| expand_path(p, base_dir, home.as_deref());

        self.paths.input_pdf_dir = resolve(&self.paths.input_pdf_dir);
        self.paths.mineru_output_dir = resolve(&self.paths.mineru_output_dir);
        self.paths.export_dir = resolve(&self.paths.export_dir);
        self.onenote.token_cache_file = resolve(&self.onenote.token_cache_file);
    }

    pub fn profile_registry(&self) -> Result<ProfileRegistry, ConfigError> {
        let registry = ProfileRegistry::with_custom(&self.statement.profiles)?;
        registry.get(&self.statement.profile)?;
        Ok(registry)
    }

    /// Live sync needs an Azure app registration.
    pub fn check_live_sync(&self) -> Result<(), ConfigError> {
        if self.onenote.graph_enabled && self.onenote.client_id.trim().is_empty() {
            return Err(ConfigError::MissingClientId);
        }
        Ok(())
    }
}

/// Load `path`, apply `overrides` and resolve paths against the file's directory.
pub fn load_resolved(path: &Path, overrides: &Overrides) -> Result<Config, ConfigError> {
    let mut cfg = Config::load(path)?;
    cfg.apply(overrides);
    cfg.resolve_paths(&config_dir(path));
    Ok(cfg)
}

pub fn config_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `~` → `home`, then anything still relative is joined onto `base_dir`.
pub fn expand_path(path: &Path, base_dir: &Path, home: Option<&Path>) -> PathBuf {
    let expanded = match (path.strip_prefix("~"), home) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    };
    if expanded.is_absolute() {
        expanded
    } else {
        base_dir.join(expanded)
    }
}
