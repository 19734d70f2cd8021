//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use tepdiag_core::{
    CascadeTrainer, PhaseOutcome, ProgressReporter, RunOptions, RunSummary, evaluate,
    prepare_split, run_pipeline,
};
use tepdiag_etl::{convert_csv_to_parquet, fetch_dataset, merge_master};
use tepdiag_shared::{Layout, PipelineConfig, default_config_path, init_config, load_config};
use tepdiag_storage::FsStore;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// tepdiag: Tennessee Eastman Process fault detection pipeline.
#[derive(Parser)]
#[command(
    name = "tepdiag",
    version,
    about = "ETL and two-stage fault diagnosis training for the Tennessee Eastman Process dataset.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ./tepdiag.toml when present).
    #[arg(long, global = true, env = "TEPDIAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
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

/// Overrides for the `[defaults]` section.
#[derive(Args, Debug, Default)]
pub(crate) struct SplitArgs {
    /// Simulation runs kept per fault number (0 = all).
    #[arg(long)]
    pub n_simulations: Option<usize>,

    /// Fraction of runs held out for testing.
    #[arg(long)]
    pub test_size: Option<f64>,

    /// Seed for the run shuffle.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl SplitArgs {
    fn apply(&self, options: &mut RunOptions) {
        if let Some(n) = self.n_simulations {
            options.n_simulations = n;
        }
        if let Some(size) = self.test_size {
            options.test_size = size;
        }
        if let Some(seed) = self.seed {
            options.seed = seed;
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Import the raw CSVs from a local dataset download.
    Fetch {
        /// Dataset directory (defaults to the kagglehub cache).
        #[arg(long = "from")]
        from: Option<PathBuf>,
    },

    /// Convert raw CSVs to Parquet.
    Convert,

    /// Merge normal and faulty training data into the master dataset.
    Merge,

    /// Load, subsample and split by run; archive the test set.
    Split {
        #[command(flatten)]
        split: SplitArgs,
    },

    /// Train the detector and diagnostician.
    Train {
        #[command(flatten)]
        split: SplitArgs,

        /// Retrain even when model artifacts exist.
        #[arg(long)]
        force: bool,
    },

    /// Evaluate the trained cascade on the archived test set.
    Evaluate {
        /// Print metrics as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run every stage end to end.
    Run {
        /// Dataset directory (defaults to the kagglehub cache).
        #[arg(long = "from")]
        from: Option<PathBuf>,

        #[command(flatten)]
        split: SplitArgs,

        /// Retrain even when model artifacts exist.
        #[arg(long)]
        force: bool,

        /// Skip evaluation after training.
        #[arg(long)]
        no_eval: bool,
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
    /// Write a config file with defaults.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
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
        0 => "tepdiag=info",
        1 => "tepdiag=debug",
        _ => "tepdiag=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

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

/// Resolved config plus the store every stage reads and writes through.
struct Context {
    config: PipelineConfig,
    layout: Layout,
    store: FsStore,
}

impl Context {
    fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = load_config(config_path)?;
        Ok(Self {
            layout: Layout::from(&config),
            config,
            store: FsStore::new("."),
        })
    }
}

/// Run the CLI command.
pub(crate) fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Command::Fetch { from } => cmd_fetch(&Context::load(config_path)?, from.as_deref()),
        Command::Convert => cmd_convert(&Context::load(config_path)?),
        Command::Merge => cmd_merge(&Context::load(config_path)?),
        Command::Split { split } => cmd_split(&Context::load(config_path)?, &split),
        Command::Train { split, force } => cmd_train(&Context::load(config_path)?, &split, force),
        Command::Evaluate { json } => cmd_evaluate(&Context::load(config_path)?, json),
        Command::Run {
            from,
            split,
            force,
            no_eval,
        } => {
            let ctx = Context::load(config_path)?;
            let mut options = RunOptions::from_config(&ctx.config);
            split.apply(&mut options);
            options.source = from;
            options.force = force;
            options.evaluate = !no_eval;
            cmd_run(&ctx, &options)
        }
        Command::Config { action } => match action {
            ConfigAction::Init { force } => cmd_config_init(config_path, force),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
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
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _summary: &RunSummary) {
        self.finish();
    }
}

/// Run one stage behind a spinner.
fn with_spinner<T>(message: &str, stage: impl FnOnce() -> tepdiag_shared::Result<T>) -> Result<T> {
    let progress = CliProgress::new();
    progress.phase(message);
    let result = stage();
    progress.finish();
    Ok(result?)
}

fn describe(outcome: &PhaseOutcome) -> String {
    match outcome {
        PhaseOutcome::Trained { rows, classes } => {
            format!("trained on {rows} rows, classes {classes:?}")
        }
        PhaseOutcome::Skipped => "present, skipped".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

fn cmd_fetch(ctx: &Context, from: Option<&Path>) -> Result<()> {
    let report = with_spinner("Fetching raw dataset", || {
        fetch_dataset(&ctx.store, &ctx.layout, &ctx.config, from)
    })?;

    if report.already_present() {
        println!("Raw data already present in {}", report.raw_dir.display());
    } else {
        println!(
            "Imported {} file(s) into {}",
            report.imported.len(),
            report.raw_dir.display()
        );
    }
    Ok(())
}

fn cmd_convert(ctx: &Context) -> Result<()> {
    let report = with_spinner("Converting CSV to Parquet", || {
        convert_csv_to_parquet(&ctx.store, &ctx.layout)
    })?;

    println!();
    println!("  Converted:  {}", report.converted.len());
    println!("  Up to date: {}", report.up_to_date.len());
    println!("  Missing:    {}", report.missing.len());
    println!("  Failed:     {}", report.failed.len());
    println!();
    Ok(())
}

fn cmd_merge(ctx: &Context) -> Result<()> {
    let master = with_spinner("Merging normal and faulty data", || {
        merge_master(&ctx.store, &ctx.layout)
    })?;

    if master.height() == 0 {
        return Err(eyre!("merge produced no rows; the master dataset was not written"));
    }
    println!(
        "Master dataset: {} rows × {} columns at {}",
        master.height(),
        master.width(),
        ctx.layout.master().display()
    );
    Ok(())
}

fn cmd_split(ctx: &Context, args: &SplitArgs) -> Result<()> {
    let mut options = RunOptions::from_config(&ctx.config);
    args.apply(&mut options);

    let split = with_spinner("Splitting by simulation run", || {
        prepare_split(&ctx.store, &ctx.layout, &options)
    })?;

    println!();
    println!("  Train rows: {}", split.train.rows());
    println!("  Test rows:  {}", split.test.rows());
    println!("  Test runs:  {}", split.test_runs.join(", "));
    println!("  Test set:   {}", ctx.layout.test_set().display());
    println!();
    Ok(())
}

fn cmd_train(ctx: &Context, args: &SplitArgs, force: bool) -> Result<()> {
    let mut options = RunOptions::from_config(&ctx.config);
    args.apply(&mut options);

    info!(force, n_simulations = options.n_simulations, "training cascade");

    let report = with_spinner("Training cascade", || {
        let split = prepare_split(&ctx.store, &ctx.layout, &options)?;
        CascadeTrainer::new(&ctx.store, &ctx.layout, &ctx.config.models).train(
            &split.train.features,
            &split.train.labels,
            force,
        )
    })?;

    println!();
    println!("  Detector:      {}", describe(&report.detector));
    println!("  Diagnostician: {}", describe(&report.diagnostician));
    println!("  State:         {:?}", report.state);
    println!();
    Ok(())
}

fn cmd_evaluate(ctx: &Context, json: bool) -> Result<()> {
    let metrics = with_spinner("Evaluating cascade", || evaluate(&ctx.store, &ctx.layout))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&metrics)?);
    } else {
        println!();
        println!("{metrics}");
        println!();
    }
    Ok(())
}

fn cmd_run(ctx: &Context, options: &RunOptions) -> Result<()> {
    let reporter = CliProgress::new();
    let result = run_pipeline(&ctx.store, &ctx.config, options, &reporter);
    reporter.finish();
    let summary = result?;

    println!();
    println!("  Pipeline complete!");
    println!("  Master rows:   {}", summary.master_rows);
    println!("  Train rows:    {}", summary.train_rows);
    println!("  Test rows:     {} ({} runs)", summary.test_rows, summary.test_runs.len());
    println!("  Detector:      {}", describe(&summary.train.detector));
    println!("  Diagnostician: {}", describe(&summary.train.diagnostician));
    if let Some(metrics) = &summary.metrics {
        println!();
        println!("{metrics}");
    }
    println!();
    println!("  Time:          {:.1}s", summary.elapsed.as_secs_f64());
    println!();
    Ok(())
}

fn cmd_config_init(path: Option<&Path>, force: bool) -> Result<()> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if path.exists() && !force {
        return Err(eyre!(
            "{} already exists; pass --force to overwrite",
            path.display()
        ));
    }
    let path = init_config(&path)?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config: PipelineConfig = load_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
