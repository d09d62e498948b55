//! PDF → markdown conversion by shelling out to the `mineru` CLI.
//!
//! Each PDF gets its own output directory `<output_root>/<pdf stem>`. A PDF
//! whose directory already holds markdown is skipped unless forced.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use walkdir::WalkDir;

use ledgernote_ingest::discover_markdowns;

use crate::config::MineruSection;

const STDERR_EXCERPT: usize = 500;

/// Split `mineru.command` into words with POSIX shell quoting rules.
pub fn split_command(line: &str) -> Result<Vec<String>> {
    shlex::split(line).with_context(|| format!("unbalanced quotes in mineru.command '{line}'"))
}

/// Full argv for converting `pdf` into `out_dir`.
pub fn build_command(command: &str, args: &[String], pdf: &Path, out_dir: &Path) -> Result<Vec<String>> {
    let mut argv = split_command(command)?;
    if argv.is_empty() {
        bail!("mineru.command is empty");
    }
    let input = pdf.display().to_string();
    let output = out_dir.display().to_string();
    argv.extend(
        args.iter()
            .map(|a| a.replace("{input}", &input).replace("{output}", &output)),
    );
    Ok(argv)
}

/// PDFs under `dir`, sorted. Symlinks are not followed.
pub fn discover_pdfs(dir: &Path, recursive: bool) -> std::io::Result<Vec<PathBuf>> {
    let walker = WalkDir::new(dir)
        .follow_links(false)
        .max_depth(if recursive { usize::MAX } else { 1 });

    let mut out = Vec::new();
    for entry in walker {
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
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub recursive: bool,
    pub force: bool,
    pub fail_fast: bool,
}

#[derive(Debug, Default)]
pub struct ConversionSummary {
    pub converted: usize,
    pub skipped: usize,
    pub failed: Vec<(PathBuf, String)>,
}

pub struct MineruRunner<'a> {
    section: &'a MineruSection,
    options: RunOptions,
}

impl<'a> MineruRunner<'a> {
    pub fn new(section: &'a MineruSection, options: RunOptions) -> Self {
        Self { section, options }
    }

    /// Convert every PDF in `input_dir` into `output_root`.
    pub fn convert_folder(&self, input_dir: &Path, output_root: &Path) -> Result<ConversionSummary> {
        let pdfs = discover_pdfs(input_dir, self.options.recursive)
            .with_context(|| format!("list {}", input_dir.display()))?;
        tracing::info!("found {} PDF(s) in {}", pdfs.len(), input_dir.display());

        let mut summary = ConversionSummary::default();
        for pdf in pdfs {
            match self.convert_pdf(&pdf, output_root) {
                Ok(true) => summary.converted += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!("failed to convert {}: {e:#}", pdf.display());
                    if self.options.fail_fast {
                        return Err(e);
                    }
                    summary.failed.push((pdf, format!("{e:#}")));
                }
            }
        }
        Ok(summary)
    }

    /// Returns `false` when the PDF was already converted and skipped.
    pub fn convert_pdf(&self, pdf: &Path, output_root: &Path) -> Result<bool> {
        let stem = pdf
            .file_stem()
            .with_context(|| format!("no file name in {}", pdf.display()))?;
        let out_dir = output_root.join(stem);

        if !self.options.force && has_markdown(&out_dir) {
            tracing::info!("skipping already converted {}", pdf.display());
            return Ok(false);
        }

        fs::create_dir_all(&out_dir).with_context(|| format!("create {}", out_dir.display()))?;
        let argv = build_command(&self.section.command, &self.section.args, pdf, &out_dir)?;
        let (bin, args) = argv.split_first().context("empty argv")?;
        which::which(bin).with_context(|| format!("'{bin}' not found on PATH"))?;

        tracing::info!("running MinerU for {}", pdf.display());
        let output = Command::new(bin)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("running {bin}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.trim().chars().take(STDERR_EXCERPT).collect();
            bail!("{bin} exited with {}: {excerpt}", output.status);
        }
        if !has_markdown(&out_dir) {
            bail!("{bin} produced no markdown in {}", out_dir.display());
        }
        Ok(true)
    }
}

fn has_markdown(dir: &Path) -> bool {
    dir.is_dir() && discover_markdowns(dir).is_ok_and(|files| !files.is_empty())
}
