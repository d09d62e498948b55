use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use ledgernote_report::{render_report, write_preview};

mod config;
mod logging;
mod mineru;
mod onenote;
mod pipeline;
mod setup;

use config::{Config, ConfigError, Overrides};
use onenote::{
    ConsoleDeviceLogin, FileTokenStore, GraphClient, Headless, InteractiveAuth, MicrosoftIdentity,
    SyncError, TokenProvider, sync_report,
};
use pipeline::{DateRange, ExportSettings, export_report, load_exported, load_statements};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("LEDGERNOTE_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(
    name = "ledgernote",
    version = VERSION,
    about = "Bank statement markdown to monthly CSV, charts and OneNote"
)]
struct Cli {
    /// Path to config.toml
    #[arg(long, global = true, default_value = "./config.toml")]
    config: PathBuf,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Mask runs of six or more digits in log output
    #[arg(long, global = true)]
    redact_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive setup: write or edit the config file
    Init,

    /// Export CSV, charts and the HTML preview from existing MinerU markdown
    Export(ExportArgs),

    /// Rebuild the preview from all_transactions.csv and sync it to OneNote
    SyncOnenote {
        #[arg(long)]
        export: Option<PathBuf>,

        #[command(flatten)]
        onenote: OneNoteArgs,
    },

    /// Convert PDFs with MinerU, export, then sync when OneNote is enabled
    Run {
        /// Statement PDF folder
        #[arg(long)]
        input: Option<PathBuf>,

        #[command(flatten)]
        export: ExportArgs,

        #[command(flatten)]
        onenote: OneNoteArgs,

        /// Re-convert PDFs that already have markdown
        #[arg(long)]
        force: bool,

        /// Stop at the first PDF that fails to convert
        #[arg(long)]
        fail_fast: bool,

        /// Only look at PDFs directly inside the input folder
        #[arg(long)]
        no_recursive: bool,
    },
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// MinerU markdown folder
    #[arg(long)]
    out: Option<PathBuf>,

    /// Export folder
    #[arg(long)]
    export: Option<PathBuf>,

    /// Keep transactions on or after this date (YYYY-MM-DD)
    #[arg(long)]
    start_date: Option<String>,

    /// Keep transactions on or before this date (YYYY-MM-DD)
    #[arg(long)]
    end_date: Option<String>,

    /// Write CSV files with a UTF-8 byte order mark
    #[arg(long)]
    csv_utf8_bom: bool,

    /// Also write monthly_transactions.xlsx
    #[arg(long)]
    excel: bool,
}

#[derive(Args, Debug)]
struct OneNoteArgs {
    #[arg(long)]
    onenote_page_title: Option<String>,

    #[arg(long)]
    onenote_notebook: Option<String>,

    #[arg(long)]
    onenote_section: Option<String>,

    /// Push to Microsoft Graph even if graph_enabled is false
    #[arg(long)]
    onenote_live: bool,

    /// Skip OneNote entirely
    #[arg(long)]
    no_onenote: bool,
}

impl OneNoteArgs {
    fn apply_to(&self, o: &mut Overrides) {
        o.page_title = self.onenote_page_title.clone();
        o.notebook = self.onenote_notebook.clone();
        o.section = self.onenote_section.clone();
        o.onenote_live = self.onenote_live;
        o.no_onenote = self.no_onenote;
    }
}

impl ExportArgs {
    fn apply_to(&self, o: &mut Overrides) {
        o.out = self.out.clone();
        o.export = self.export.clone();
        o.csv_utf8_bom = self.csv_utf8_bom;
        o.excel = self.excel;
    }

    fn date_range(&self) -> Result<DateRange, ConfigError> {
        DateRange::parse(self.start_date.as_deref(), self.end_date.as_deref())
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::setup_logging(cli.verbose, cli.redact_logs) {
        eprintln!("error: logging: {e}");
        return ExitCode::from(1);
    }

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code_for(&e))
        }
    }
}

/// 2 for configuration problems caught before any output, 1 otherwise.
fn exit_code_for(e: &anyhow::Error) -> u8 {
    if e.downcast_ref::<ConfigError>().is_some() { 2 } else { 1 }
}

fn run(cli: Cli) -> Result<()> {
    if let Command::Init = cli.command {
        return setup::run_init(&cli.config);
    }

    if !cli.config.exists() {
        if !std::io::stdin().is_terminal() {
            return Err(ConfigError::NotFound(cli.config.clone()))
                .with_context(|| format!("run `ledgernote init --config {}` first", cli.config.display()));
        }
        setup::run_first_time_setup(&cli.config)?;
    }

    match cli.command {
        Command::Init => Ok(()),
        Command::Export(args) => cmd_export(&cli.config, &args),
        Command::SyncOnenote { export, onenote } => cmd_sync(&cli.config, export, &onenote),
        Command::Run {
            input,
            export,
            onenote,
            force,
            fail_fast,
            no_recursive,
        } => {
            let mut overrides = Overrides {
                input,
                ..Default::default()
            };
            export.apply_to(&mut overrides);
            onenote.apply_to(&mut overrides);
            let opts = mineru::RunOptions {
                recursive: !no_recursive,
                force,
                fail_fast,
            };
            cmd_run(&cli.config, &overrides, &export, opts)
        }
    }
}

fn cmd_export(config_path: &Path, args: &ExportArgs) -> Result<()> {
    let mut overrides = Overrides::default();
    args.apply_to(&mut overrides);
    let cfg = config::load_resolved(config_path, &overrides)?;
    let range = args.date_range()?;

    export(&cfg, &range)?;
    Ok(())
}

fn export(cfg: &Config, range: &DateRange) -> Result<pipeline::ExportOutcome> {
    let registry = cfg.profile_registry()?;
    let profile = registry.get(&cfg.statement.profile)?;

    let transactions = load_statements(&cfg.paths.mineru_output_dir, profile)?;
    let outcome = export_report(transactions, range, &ExportSettings::from_config(cfg))?;

    println!(
        "Exported {} transactions in {} month(s) to {}",
        outcome.report.transaction_count(),
        outcome.report.len(),
        cfg.paths.export_dir.display()
    );
    println!("Combined CSV: {}", outcome.csv.combined.display());
    if let Some(workbook) = &outcome.workbook {
        println!("Workbook: {}", workbook.display());
    }
    println!("Preview: {}", outcome.preview.display());
    Ok(outcome)
}

fn cmd_run(
    config_path: &Path,
    overrides: &Overrides,
    args: &ExportArgs,
    opts: mineru::RunOptions,
) -> Result<()> {
    let cfg = config::load_resolved(config_path, overrides)?;
    let range = args.date_range()?;
    cfg.profile_registry()?;
    if cfg.onenote.enabled {
        cfg.check_live_sync()?;
    }
    if !cfg.paths.input_pdf_dir.is_dir() {
        return Err(ConfigError::MissingDirectory {
            what: "PDF input directory",
            path: cfg.paths.input_pdf_dir.clone(),
        }
        .into());
    }

    let runner = mineru::MineruRunner::new(&cfg.mineru, opts);
    let summary = runner.convert_folder(&cfg.paths.input_pdf_dir, &cfg.paths.mineru_output_dir)?;
    println!(
        "MinerU: {} converted, {} skipped, {} failed",
        summary.converted,
        summary.skipped,
        summary.failed.len()
    );

    let outcome = export(&cfg, &range)?;

    if cfg.onenote.enabled && cfg.onenote.graph_enabled {
        let settings = ExportSettings::from_config(&cfg);
        push_to_onenote(&cfg, &outcome.report, &outcome.charts, &settings)?;
    }
    Ok(())
}

fn cmd_sync(config_path: &Path, export: Option<PathBuf>, args: &OneNoteArgs) -> Result<()> {
    let mut overrides = Overrides {
        export,
        ..Default::default()
    };
    args.apply_to(&mut overrides);
    let cfg = config::load_resolved(config_path, &overrides)?;
    cfg.check_live_sync()?;

    let settings = ExportSettings::from_config(&cfg);
    let (report, charts) = load_exported(&settings)?;
    let preview = write_preview(
        &settings.export_dir,
        &render_report(report.buckets(), &charts, &settings.destination, settings.html),
    )?;
    println!("Preview: {}", preview.display());

    if cfg.onenote.graph_enabled {
        push_to_onenote(&cfg, &report, &charts, &settings)?;
    } else {
        println!("Live sync is off; pass --onenote-live or set onenote.graph_enabled = true");
    }
    Ok(())
}

fn push_to_onenote(
    cfg: &Config,
    report: &ledgernote_core::MonthlyReport,
    charts: &std::collections::BTreeMap<ledgernote_core::MonthKey, ledgernote_report::ChartPaths>,
    settings: &ExportSettings,
) -> Result<(), SyncError> {
    let authority = MicrosoftIdentity::new(&cfg.onenote.tenant, &cfg.onenote.client_id, &cfg.onenote.scopes)?;
    let store = FileTokenStore::new(&cfg.onenote.token_cache_file);
    let interactive: &dyn InteractiveAuth = if std::io::stdin().is_terminal() {
        &ConsoleDeviceLogin
    } else {
        &Headless
    };

    let token = TokenProvider::new(&authority, &store, interactive).access_token(Utc::now())?;
    let graph = GraphClient::new(token)?;
    let pages = sync_report(
        &graph,
        report,
        charts,
        &settings.destination,
        settings.html,
        cfg.onenote.page_per_month,
    )?;

    for page in pages {
        let verb = if page.created { "Created" } else { "Updated" };
        match page.web_url {
            Some(url) => println!("{verb} OneNote page '{}': {url}", page.title),
            None => println!("{verb} OneNote page '{}'", page.title),
        }
    }
    Ok(())
}
