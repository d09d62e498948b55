use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::Config;

/// Line-based prompts over any reader/writer pair.
pub struct Prompter<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Prompter<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_answer(&mut self) -> Result<String> {
        let mut s = String::new();
        self.input.read_line(&mut s).context("read answer")?;
        Ok(s.trim().to_string())
    }

    pub fn text(&mut self, label: &str, default: &str) -> Result<String> {
        write!(self.output, "{label} [{default}]: ")?;
        self.output.flush().ok();
        let answer = self.read_answer()?;
        Ok(if answer.is_empty() { default.to_string() } else { answer })
    }

    pub fn path(&mut self, label: &str, default: &Path) -> Result<PathBuf> {
        let answer = self.text(label, &default.display().to_string())?;
        Ok(PathBuf::from(answer))
    }

    pub fn yes_no(&mut self, label: &str, default: bool) -> Result<bool> {
        let hint = if default { "Y/n" } else { "y/N" };
        write!(self.output, "{label} [{hint}]: ")?;
        self.output.flush().ok();
        let answer = self.read_answer()?.to_lowercase();
        Ok(match answer.as_str() {
            "" => default,
            "y" | "yes" | "true" | "1" => true,
            _ => false,
        })
    }

    pub fn say(&mut self, line: &str) -> Result<()> {
        writeln!(self.output, "{line}")?;
        Ok(())
    }
}

/// Ask for the settings people usually change, starting from `cfg`.
pub fn ask_settings<R: BufRead, W: Write>(p: &mut Prompter<R, W>, mut cfg: Config) -> Result<Config> {
    cfg.paths.input_pdf_dir = p.path("Statement PDF folder", &cfg.paths.input_pdf_dir)?;
    cfg.paths.mineru_output_dir = p.path("MinerU markdown folder", &cfg.paths.mineru_output_dir)?;
    cfg.paths.export_dir = p.path("Export folder (CSV, charts, preview)", &cfg.paths.export_dir)?;
    cfg.mineru.command = p.text("MinerU command", &cfg.mineru.command)?;
    cfg.statement.profile = p.text("Bank format profile", &cfg.statement.profile)?;

    cfg.onenote.enabled = p.yes_no("Prepare a OneNote page", cfg.onenote.enabled)?;
    if cfg.onenote.enabled {
        cfg.onenote.graph_enabled = p.yes_no("Sync to OneNote through Microsoft Graph", cfg.onenote.graph_enabled)?;
        cfg.onenote.notebook_name = p.text("OneNote notebook", &cfg.onenote.notebook_name)?;
        cfg.onenote.section_name = p.text("OneNote section", &cfg.onenote.section_name)?;
        cfg.onenote.page_title = p.text("OneNote page title", &cfg.onenote.page_title)?;
        if cfg.onenote.graph_enabled {
            cfg.onenote.tenant = p.text("Azure tenant", &cfg.onenote.tenant)?;
            cfg.onenote.client_id = p.text("Azure app client id", &cfg.onenote.client_id)?;
        }
    }
    Ok(cfg)
}

/// `ledgernote init`: edit (or create) the config at `path`.
pub fn run_init(path: &Path) -> Result<()> {
    let stdin = std::io::stdin();
    let mut p = Prompter::new(stdin.lock(), std::io::stdout());
    p.say("ledgernote setup\n")?;

    let cfg = ask_settings(&mut p, Config::load_or_default(path)?)?;
    cfg.save(path)?;
    p.say(&format!("\nWrote {}", path.display()))?;
    Ok(())
}

/// Runs when no config exists and stdin is a terminal.
pub fn run_first_time_setup(path: &Path) -> Result<()> {
    let stdin = std::io::stdin();
    let mut p = Prompter::new(stdin.lock(), std::io::stdout());
    p.say(&format!("No config at {}. A few questions first.\n", path.display()))?;

    let cfg = ask_settings(&mut p, Config::default())?;
    cfg.save(path)?;
    p.say(&format!("\nWrote {}", path.display()))?;
    p.say("Edit it any time, or re-run: ledgernote init")?;
    Ok(())
}
