//! skimflow CLI

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sf_skim::{SkimConfig, SkimRunner, read_skim_config};

mod report;

#[derive(Parser)]
#[command(name = "skimflow")]
#[command(about = "skimflow - cut-flow skimming of columnar event data")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a skim and print the verification report
    Skim {
        /// Skim config (YAML, or JSON by `.json` extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Output artifact (overrides `output` in the config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Process at most this many files (0 = all)
        #[arg(long)]
        max_files: Option<usize>,

        /// Threads (0 = auto, 1 = sequential)
        #[arg(long)]
        threads: Option<usize>,

        /// Also write the run summary as pretty JSON.
        #[arg(long)]
        summary_json: Option<PathBuf>,
    },

    /// Resolve and print the input file list
    Files {
        /// Skim config (YAML, or JSON by `.json` extension)
        #[arg(short, long)]
        config: PathBuf,

        /// Process at most this many files (0 = all)
        #[arg(long)]
        max_files: Option<usize>,
    },

    /// Print the cut-flow and histograms stored in an artifact
    Inspect {
        /// Skim artifact (Parquet)
        artifact: PathBuf,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Print version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Skim { config, output, max_files, threads, summary_json } => {
            cmd_skim(&config, output, max_files, threads, summary_json.as_ref())
        }
        Commands::Files { config, max_files } => cmd_files(&config, max_files),
        Commands::Inspect { artifact, json } => cmd_inspect(&artifact, json),
        Commands::Version => {
            println!("skimflow {}", sf_core::VERSION);
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<SkimConfig> {
    read_skim_config(path).with_context(|| format!("failed to load config {}", path.display()))
}

fn cmd_skim(
    config: &Path,
    output: Option<PathBuf>,
    max_files: Option<usize>,
    threads: Option<usize>,
    summary_json: Option<&PathBuf>,
) -> Result<()> {
    let mut cfg = load_config(config)?;
    if let Some(out) = output {
        cfg.output = out;
    }
    if max_files.is_some() {
        cfg.max_files = max_files;
    }
    if let Some(t) = threads {
        cfg.threads = t;
    }

    let summary = SkimRunner::new(cfg).run().map_err(|e| {
        let what = if e.is_build_error() {
            "skim rejected before reading any event"
        } else {
            "skim failed"
        };
        anyhow::Error::new(e).context(what)
    })?;
    print!("{}", report::validation_report(&summary)?);

    if let Some(path) = summary_json {
        std::fs::write(path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    Ok(())
}

fn cmd_files(config: &Path, max_files: Option<usize>) -> Result<()> {
    let mut cfg = load_config(config)?;
    if max_files.is_some() {
        cfg.max_files = max_files;
    }
    let files = SkimRunner::new(cfg).resolve_inputs().context("failed to resolve inputs")?;
    for f in &files {
        println!("{f}");
    }
    tracing::info!(files = files.len(), "resolved inputs");
    Ok(())
}

fn cmd_inspect(artifact: &Path, json: bool) -> Result<()> {
    let contents = sf_io::read_artifact(artifact)
        .with_context(|| format!("failed to read artifact {}", artifact.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report::inspect_json(&contents))?);
    } else {
        print!("{}", report::inspect_report(&contents)?);
    }
    Ok(())
}
