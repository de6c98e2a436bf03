use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tabprep::dataset::TabularDataset;
use tabprep::pipeline::{PipelineConfig, PipelineRun};
use tabprep::{inspect, io};

#[derive(Parser)]
#[command(
    name = "tabprep",
    version,
    about = "Preprocess tabular data and fit a model from a JSON pipeline config"
)]
pub struct Cli {
    /// Log at debug level (RUST_LOG still takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a pipeline on a data file and report hold-out scores
    Run {
        /// Input file (CSV, Parquet, JSON)
        input: PathBuf,

        /// Path to the JSON pipeline config
        #[arg(short, long, env = "TABPREP_CONFIG")]
        config: PathBuf,

        /// Target column; overrides the config's target
        #[arg(short, long)]
        target: Option<String>,

        /// Write the processed training rows (features and target) here
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the run report as JSON here
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print a per-column summary of a data file
    Inspect {
        /// Input file (CSV, Parquet, JSON)
        input: PathBuf,
    },
}

pub fn run_command(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            input,
            config,
            target,
            output,
            report,
        } => handle_run(&input, &config, target, output.as_deref(), report.as_deref()),
        Commands::Inspect { input } => handle_inspect(&input),
    }
}

fn handle_run(
    input: &Path,
    config_path: &Path,
    target: Option<String>,
    output: Option<&Path>,
    report_path: Option<&Path>,
) -> Result<()> {
    let config = PipelineConfig::from_file(config_path).context("Failed to load pipeline config")?;
    let target = target.unwrap_or_else(|| config.target.clone());
    let pipeline = config.build().context("Failed to build pipeline")?;

    let dataset = io::load_dataset(input).context("Failed to load input file")?;
    println!(
        "Loaded {} rows x {} columns from {}",
        dataset.n_rows(),
        dataset.n_columns(),
        input.display()
    );

    let run = pipeline
        .run(dataset, &target)
        .with_context(|| format!("Pipeline '{}' failed", config.name))?;

    for stage in &run.report.stages {
        println!("  {}", stage.summary());
        for warning in &stage.warnings {
            println!("    warning: {warning}");
        }
    }
    println!("{}", run.report.summary());
    println!("{}", run.evaluate().context("Failed to evaluate model")?);

    if let Some(path) = output {
        let train = training_rows(&run)?;
        io::save_dataset(&train, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {} training rows to {}", train.n_rows(), path.display());
    }

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&run.report).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote run report to {}", path.display());
    }

    Ok(())
}

/// Processed training features with the target column appended.
fn training_rows(run: &PipelineRun) -> Result<TabularDataset> {
    let mut train = run.split.train_features.clone();
    train
        .push_column(run.split.train_target.clone())
        .context("Failed to attach target column")?;
    Ok(train)
}

fn handle_inspect(input: &Path) -> Result<()> {
    let dataset = io::load_dataset(input).context("Failed to load input file")?;
    println!(
        "{}: {} rows x {} columns, {} missing cells\n",
        input.display(),
        dataset.n_rows(),
        dataset.n_columns(),
        dataset.missing_count()
    );
    print!("{}", inspect::render(&inspect::summarise(&dataset)?));
    Ok(())
}
