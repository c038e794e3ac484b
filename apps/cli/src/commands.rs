//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use chrono::{Days, Local, NaiveDate};
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use tenderflow_bundle::Unpacker;
use tenderflow_core::{Pipeline, ProgressReporter, RunReport};
use tenderflow_extract::Extractor;
use tenderflow_shared::{
    AppConfig, TenderStatus, config_file_path, init_config, load_config, load_config_from,
};
use tenderflow_source::{ManifestSource, PortalSource, TenderSource, parse_portal_date};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// tenderflow: tender document ingestion.
#[derive(Parser)]
#[command(
    name = "tenderflow",
    version,
    about = "Fetch procurement tenders, extract their documents, and forward enriched records.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.tenderflow/tenderflow.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process the tenders published on a day.
    Run {
        /// Publication date, DD/MM/YYYY (defaults to yesterday).
        #[arg(long)]
        date: Option<String>,

        /// Read tenders from a JSON manifest instead of the portal.
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Summary CSV path (overrides the config).
        #[arg(long)]
        out: Option<PathBuf>,

        /// Also write a JSON dump next to the summary.
        #[arg(long)]
        json: bool,
    },

    /// Extract and print the text of one document.
    Extract {
        /// Document to extract.
        file: PathBuf,
    },

    /// Unpack a bundle next to itself and list the files it contains.
    Unpack {
        /// Bundle to unpack.
        bundle: PathBuf,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration (secrets redacted).
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "tenderflow=info",
        1 => "tenderflow=debug",
        _ => "tenderflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run {
            date,
            manifest,
            out,
            json,
        } => cmd_run(config_path, date.as_deref(), manifest.as_deref(), out, json).await,
        Command::Extract { file } => cmd_extract(config_path, &file),
        Command::Unpack { bundle } => cmd_unpack(config_path, &bundle),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

/// Config file (explicit or default) with environment overrides applied.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    config.apply_env_overrides();
    Ok(config)
}

fn yesterday() -> Option<NaiveDate> {
    Local::now().date_naive().checked_sub_days(Days::new(1))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<&Path>,
    date: Option<&str>,
    manifest: Option<&Path>,
    out: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if let Some(out) = out {
        config.output.summary_path = out.to_string_lossy().into_owned();
    }
    if json {
        config.output.write_json = true;
    }

    let date = match date {
        Some(raw) => parse_portal_date(raw)?,
        None => yesterday().ok_or_else(|| eyre!("cannot compute yesterday's date"))?,
    };

    let source: Box<dyn TenderSource> = match manifest {
        Some(path) => Box::new(ManifestSource::open(path)?),
        None => {
            // Fails naming the missing env var before anything runs.
            let credentials = config.credentials()?;
            Box::new(PortalSource::new(&config.source, credentials)?)
        }
    };

    let pipeline = Pipeline::from_config(&config)?;
    info!(
        source = source.name(),
        date = %date.format("%d/%m/%Y"),
        summary = %config.output.summary_path,
        "starting tender run"
    );

    let reporter = CliProgress::new();
    let report = pipeline.run(source.as_ref(), date, &reporter).await?;
    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    println!();
    println!("  Run complete: {}", report.run_id);
    println!("  Listed:        {}", report.listed);
    println!("  Filtered out:  {}", report.filtered_out);
    println!("  Extracted:     {}", report.count(TenderStatus::Extracted));
    println!("  Empty:         {}", report.count(TenderStatus::ExtractionEmpty));
    println!("  Download fail: {}", report.count(TenderStatus::DownloadFailed));
    println!("  Dropped:       {}", report.dropped.len());
    if report.sink_failures > 0 {
        println!("  Sink failures: {}", report.sink_failures);
    }
    match &report.artifacts {
        Some(artifacts) => {
            println!("  Summary:       {}", artifacts.summary.path.display());
            if let Some(json) = &artifacts.json {
                println!("  JSON:          {}", json.path.display());
            }
        }
        None => println!("  Summary:       not written (see logs)"),
    }
    println!("  Time:          {:.1}s", report.elapsed.as_secs_f64());
    println!();
}

fn cmd_extract(config_path: Option<&Path>, file: &Path) -> Result<()> {
    if !file.is_file() {
        return Err(eyre!("'{}' is not a file", file.display()));
    }
    let config = resolve_config(config_path)?;
    let extraction = Extractor::new(config.extraction).extract(file);

    if let Some(failure) = &extraction.failure {
        eprintln!("warning: {} ({}): {failure}", extraction.file_name(), extraction.kind);
    }
    match &extraction.text {
        Some(text) => println!("{text}"),
        None => eprintln!("no text extracted from {}", file.display()),
    }
    Ok(())
}

fn cmd_unpack(config_path: Option<&Path>, bundle: &Path) -> Result<()> {
    if !bundle.is_file() {
        return Err(eyre!("'{}' is not a file", bundle.display()));
    }
    let config = resolve_config(config_path)?;
    let unpacked = Unpacker::new(config.extraction.max_archive_depth).unpack(bundle);

    if let Some(failure) = &unpacked.failure {
        return Err(eyre!("could not unpack '{}': {failure}", bundle.display()));
    }
    for file in &unpacked.files {
        println!("{}", file.display());
    }
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let source = match config_path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };
    println!("# resolved from {} and environment", source.display());
    println!("{}", toml::to_string_pretty(&config.redacted())?);
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn tender_started(&self, reference: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Processing [{current}/{total}] {reference}"));
    }

    fn tender_finished(&self, reference: &str, status: Option<TenderStatus>) {
        let outcome = status.map_or("dropped", |s| s.as_str());
        self.spinner.println(format!("  {reference}: {outcome}"));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "tenderflow",
            "-vv",
            "run",
            "--date",
            "11/03/2026",
            "--manifest",
            "tenders.json",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Run {
                date,
                manifest,
                out,
                json,
            } => {
                assert_eq!(date.as_deref(), Some("11/03/2026"));
                assert_eq!(manifest, Some(PathBuf::from("tenders.json")));
                assert_eq!(out, None);
                assert!(json);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli =
            Cli::try_parse_from(["tenderflow", "config", "show", "--config", "/tmp/t.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/t.toml")));
    }

    #[test]
    fn yesterday_is_before_today() {
        assert!(yesterday().unwrap() < Local::now().date_naive());
    }
}
