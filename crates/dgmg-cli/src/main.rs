//! DGMG CLI - train and sample graph generators from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Show the merged configuration of a dataset
//! dgmg config --dataset cycles
//!
//! # Train on the built-in trace and save the weights
//! dgmg train --dataset cycles --epochs 50 --save model.safetensors
//!
//! # Train on traces from a file
//! dgmg train --dataset cycles --trace traces.json
//!
//! # Sample graphs from saved weights
//! dgmg generate --dataset cycles --weights model.safetensors --count 5 --format dot
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default
//! `dgmg=info`).

use anyhow::{Context, Result};
use candle_core::Device;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dgmg_core::config::{dataset_based_configure, Options};
use dgmg_core::{GraphSummary, TraceDataset};
use dgmg_nn::Trainer;
use indicatif::ProgressBar;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dgmg")]
#[command(about = "Deep generative models of graphs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// Dataset whose configuration block is applied
    #[arg(short, long, default_value = "cycles")]
    dataset: String,

    /// JSON object of extra options (dataset values still win)
    #[arg(long)]
    options: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the merged configuration as JSON
    Config {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Train on action traces with teacher forcing
    Train {
        #[command(flatten)]
        config: ConfigArgs,

        /// JSON file of traces (default: built-in reference trace)
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Number of epochs (default: `nepochs` from the configuration)
        #[arg(long)]
        epochs: Option<usize>,

        /// Write the trained weights (safetensors)
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Sample new graphs
    Generate {
        #[command(flatten)]
        config: ConfigArgs,

        /// Weights to load (default: untrained model)
        #[arg(long)]
        weights: Option<PathBuf>,

        /// Number of graphs
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Maximum nodes per graph (default: `v_max` or `max_size`)
        #[arg(long)]
        v_max: Option<usize>,

        /// Random seed of the first graph
        #[arg(long)]
        seed: Option<u64>,

        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Aggregate statistics
    Summary,
    /// Nodes and links of every graph as JSON
    Json,
    /// Graphviz
    Dot,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dgmg=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { config } => cmd_config(&config),
        Commands::Train {
            config,
            trace,
            epochs,
            save,
        } => cmd_train(&config, trace.as_deref(), epochs, save.as_deref()),
        Commands::Generate {
            config,
            weights,
            count,
            v_max,
            seed,
            format,
        } => cmd_generate(&config, weights.as_deref(), count, v_max, seed, format),
    }
}

fn merged_options(args: &ConfigArgs) -> Result<Options> {
    let base = match &args.options {
        Some(path) => Options::from_json_file(path)
            .with_context(|| format!("Failed to load options {}", path.display()))?,
        None => Options::new(),
    };
    let opts = base.with("dataset", args.dataset.as_str());
    dataset_based_configure(&opts).context("Failed to configure dataset")
}

fn trainer(args: &ConfigArgs) -> Result<Trainer> {
    let config = merged_options(args)?
        .to_config()
        .context("Incomplete configuration")?;
    Trainer::new(config, &Device::Cpu).context("Failed to build model")
}

fn cmd_config(args: &ConfigArgs) -> Result<()> {
    let opts = merged_options(args)?;
    println!("{}", serde_json::to_string_pretty(&opts)?);
    Ok(())
}

fn load_traces(path: Option<&Path>) -> Result<TraceDataset> {
    match path {
        Some(path) => TraceDataset::from_json_file(path)
            .with_context(|| format!("Failed to load traces {}", path.display())),
        None => Ok(TraceDataset::reference()),
    }
}

fn cmd_train(
    args: &ConfigArgs,
    trace: Option<&Path>,
    epochs: Option<usize>,
    save: Option<&Path>,
) -> Result<()> {
    let mut trainer = trainer(args)?;
    let dataset = load_traces(trace)?;
    let epochs = epochs.unwrap_or(trainer.config().nepochs);

    println!(
        "Training on {} trace(s) for {} epoch(s) (lr={}, optimizer={})...",
        dataset.len(),
        epochs,
        trainer.config().lr,
        trainer.config().optimizer
    );
    let start = Instant::now();
    let pb = ProgressBar::new(epochs as u64);
    for _ in 0..epochs {
        let stats = trainer.train_epoch(&dataset)?;
        pb.set_message(format!("loss {:.4}", stats.mean_loss));
        pb.inc(1);
        println!("epoch {}: loss {:.4}", stats.epoch, stats.mean_loss);
    }
    pb.finish_and_clear();
    println!("Trained in {:.2?}", start.elapsed());

    if let Some(path) = save {
        trainer
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Saved weights to {}", path.display());
    }
    Ok(())
}

fn cmd_generate(
    args: &ConfigArgs,
    weights: Option<&Path>,
    count: usize,
    v_max: Option<usize>,
    seed: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let mut trainer = trainer(args)?;
    if let Some(path) = weights {
        trainer
            .load(path)
            .with_context(|| format!("Failed to load weights {}", path.display()))?;
    }
    let v_max = v_max.unwrap_or(trainer.config().v_max());
    let seed = seed.unwrap_or(trainer.config().seed);

    let pb = ProgressBar::new_spinner();
    pb.set_message(format!("Sampling {count} graph(s)..."));
    let (graphs, stats) = trainer.generate(count, v_max, seed)?;
    pb.finish_and_clear();

    match format {
        OutputFormat::Summary => {
            println!("Generated Graphs");
            println!("================");
            println!("Samples:    {}", stats.samples);
            println!("Mean nodes: {:.2}", stats.mean_nodes);
            println!("Mean links: {:.2}", stats.mean_links);
            println!("Max nodes:  {}", stats.max_nodes);
            for (ntype, n) in &stats.nodes_by_type {
                println!("  {ntype}: {n}");
            }
        }
        OutputFormat::Json => {
            let summaries: Vec<GraphSummary> = graphs.iter().map(|g| g.summary()).collect();
            println!("{}", serde_json::to_string_pretty(&summaries)?);
        }
        OutputFormat::Dot => {
            for g in &graphs {
                println!("{}", g.to_dot());
            }
        }
    }
    Ok(())
}
