//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use linkbak_core::{
    LinkPipeline, PipelineResult, ProgressReporter, RunSummary, Scheduler, Workspace,
    load_record, merge_records,
};
use linkbak_shared::{AppConfig, RunConfig, config_file_path, fields, init_config, load_config};
use linkbak_sources::{SourceOptions, load_links};
use linkbak_steps::catalogue;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// linkbak: archive the links of a feed, page or list.
#[derive(Parser)]
#[command(
    name = "linkbak",
    version,
    about = "Archive every link of an RSS/Atom feed, HTML page or plain list.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv). Any level also keeps failure logs.
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
    /// Archive every link found in a source.
    Archive(ArchiveArgs),

    /// Show the archive status of a single link.
    Status {
        /// The archived link.
        link: String,

        /// Output root (defaults to the configured output directory).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rebuild the global results.json from every link's record.
    Merge {
        /// Output root (defaults to the configured output directory).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Arguments of `linkbak archive`.
#[derive(Args)]
pub(crate) struct ArchiveArgs {
    /// RSS, Atom, HTML or plain-text file with links, or a URL to one.
    pub source: String,

    /// Retry steps that failed on a previous run.
    #[arg(short, long)]
    pub force: bool,

    /// Timeout in seconds for each download or external tool.
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Number of links processed in parallel (defaults to the CPU count).
    #[arg(short = 'j', long = "jobs")]
    pub jobs: Option<usize>,

    /// Output root (defaults to the configured output directory).
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Chrome/Chromium binary used for rendering.
    #[arg(long, env = "LINKBAK_CHROME")]
    pub chrome: Option<String>,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "linkbak=info",
        1 => "linkbak=debug",
        _ => "linkbak=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Archive(args) => cmd_archive(&args, cli.verbose).await,
        Command::Status { link, output } => cmd_status(&link, output),
        Command::Merge { output } => cmd_merge(output),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

/// Merge the config file with command-line overrides.
fn run_config(app: &AppConfig, args: &ArchiveArgs, verbose: u8) -> RunConfig {
    let mut config = RunConfig::from(app);
    config.force = args.force;
    config.diagnostics |= verbose > 0;
    if let Some(secs) = args.timeout {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(jobs) = args.jobs {
        config.workers = jobs;
    }
    if let Some(output) = &args.output {
        config.output_root = output.clone();
    }
    if let Some(chrome) = &args.chrome {
        config.tools.chrome_binary = chrome.clone();
    }
    config
}

fn output_root(output: Option<PathBuf>) -> Result<PathBuf> {
    match output {
        Some(path) => Ok(path),
        None => Ok(PathBuf::from(load_config()?.defaults.output_dir)),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_archive(args: &ArchiveArgs, verbose: u8) -> Result<()> {
    let app = load_config()?;
    let config = run_config(&app, args, verbose);
    config.validate()?;
    config.prepare_output_root()?;

    let links = load_links(
        &args.source,
        &SourceOptions {
            timeout: config.timeout,
        },
    )
    .await?;
    info!(
        source = %args.source,
        links = links.len(),
        workers = config.workers,
        force = config.force,
        "archiving"
    );

    let registry = catalogue(&config)?;
    let scheduler = Scheduler::new(LinkPipeline::new(registry, config.clone()));
    let progress = Arc::new(CliProgress::new(links.len()));
    let summary = scheduler.run_all(links, progress).await;

    let merged = merge_records(&config.output_root)?;

    println!();
    println!("  Archive complete!");
    println!("  Links:         {}", summary.total);
    println!("  Processed:     {}", summary.processed);
    println!("  Failed links:  {}", summary.failed.len());
    println!("  Step failures: {}", summary.step_failures);
    println!(
        "  Index:         {} ({} records)",
        merged.path.display(),
        merged.records
    );
    println!("  Time:          {:.1}s", summary.elapsed.as_secs_f64());
    for (link, error) in &summary.failed {
        println!("    ! {link}: {error}");
    }
    println!();
    Ok(())
}

fn cmd_status(link: &str, output: Option<PathBuf>) -> Result<()> {
    let mut config = RunConfig::from(&load_config()?);
    config.output_root = output_root(output)?;

    let workspace = Workspace::resolve(&config.output_root, link);
    let pipeline = LinkPipeline::new(catalogue(&config)?, config);

    println!("  Link:      {link}");
    println!("  Workspace: {}", workspace.dir().display());
    if let Ok(record) = load_record(&workspace.record_path())
        && let Some(title) = record.get_str(fields::TITLE)
    {
        println!("  Title:     {title}");
    }
    println!();
    for (step, status) in pipeline.status(link) {
        println!("  {step:<14} {status}");
    }
    Ok(())
}

fn cmd_merge(output: Option<PathBuf>) -> Result<()> {
    let root = output_root(output)?;
    let merged = merge_records(&root)?;
    println!(
        "Merged {} records into {} ({} skipped)",
        merged.records,
        merged.path.display(),
        merged.skipped
    );
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", config_file_path()?.display());
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif bar.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new(total: usize) -> Self {
        let bar = ProgressBar::new(total as u64);
        let style =
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style.progress_chars("=> "));
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn link_started(&self, link: &str) {
        self.bar.set_message(link.to_string());
    }

    fn link_finished(&self, link: &str, result: std::result::Result<&PipelineResult, &str>) {
        match result {
            Ok(result) => {
                let failed = result.failed_steps();
                if !failed.is_empty() {
                    self.bar
                        .println(format!("  {link}: failed {}", failed.join(", ")));
                }
            }
            Err(error) => self.bar.println(format!("  {link}: {error}")),
        }
        self.bar.inc(1);
    }

    fn done(&self, _summary: &RunSummary) {
        self.bar.finish_and_clear();
    }
}
