mod commands;
mod config;
mod download;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::describe::SplitQuery;
use crate::config::{
    AlignerKind, PrepareConfig, PrepareLayer, DEFAULT_DATASET, DEFAULT_PROC_DIR, DEFAULT_RAW_DIR,
};

#[derive(Parser)]
#[command(name = "faceset", about = "Face dataset manifest tooling")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the processed dataset and its manifest
    PrepareData {
        /// TOML config file
        #[arg(long)]
        config: PathBuf,
        /// Fetch the raw dataset from Kaggle first
        #[arg(long)]
        download: bool,
        #[arg(long)]
        dataset: Option<String>,
        #[arg(long)]
        raw_dir: Option<PathBuf>,
        #[arg(long)]
        proc_dir: Option<PathBuf>,
        #[arg(long)]
        manifest: Option<PathBuf>,
        /// Directory holding pairs*.txt (defaults to the raw dir)
        #[arg(long)]
        pairs_dir: Option<PathBuf>,
        #[arg(long)]
        train_ratio: Option<f64>,
        #[arg(long)]
        val_ratio: Option<f64>,
        #[arg(long)]
        version: Option<String>,
        /// Split seed; omitted means a fresh random split
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long, value_enum)]
        aligner: Option<AlignerKind>,
    },
    /// Check a manifest against the processed image tree
    ValidateManifest {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        processed_dir: PathBuf,
    },
    /// Bump the dataset version and record a change-log entry
    UpdateDataset {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        version: String,
        #[arg(long)]
        message: Option<String>,
        /// Extra change fields as key=value (repeatable)
        #[arg(long = "field", value_name = "KEY=VALUE")]
        fields: Vec<String>,
    },
    /// Summarize a manifest
    Describe {
        #[arg(long)]
        manifest: PathBuf,
        /// Also resolve this split against the processed tree
        #[arg(long)]
        split: Option<String>,
        /// Processed image root
        #[arg(long, default_value = DEFAULT_PROC_DIR)]
        processed_dir: PathBuf,
        #[arg(long, default_value_t = 1.0)]
        sample_ratio: f64,
        #[arg(long, default_value_t = faceset_core::reader::DEFAULT_SAMPLE_SEED)]
        seed: u64,
    },
    /// Download the raw dataset with the Kaggle CLI
    Download {
        #[arg(long, default_value = DEFAULT_DATASET)]
        dataset: String,
        #[arg(long, default_value = DEFAULT_RAW_DIR)]
        raw_dir: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Dispatch a command; `Ok(false)` means it ran but reported failure.
fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Commands::PrepareData {
            config,
            download,
            dataset,
            raw_dir,
            proc_dir,
            manifest,
            pairs_dir,
            train_ratio,
            val_ratio,
            version,
            seed,
            aligner,
        } => {
            let flags = PrepareLayer {
                download: download.then_some(true),
                dataset,
                raw_dir,
                proc_dir,
                manifest,
                pairs_dir,
                train_ratio,
                val_ratio,
                version,
                seed,
                aligner,
                ..Default::default()
            };
            let config = PrepareConfig::load(&config, flags)?;
            let summary = commands::prepare::run(&config)?;
            println!(
                "Wrote {} ({} items, {} pairs)",
                config.manifest.display(),
                summary.items,
                summary.pairs
            );
            Ok(true)
        }
        Commands::ValidateManifest { manifest, processed_dir } => {
            commands::validate::run(&manifest, &processed_dir)
        }
        Commands::UpdateDataset {
            manifest,
            version,
            message,
            fields,
        } => {
            commands::update::run(&manifest, &version, message.as_deref(), &fields)?;
            Ok(true)
        }
        Commands::Describe {
            manifest,
            split,
            processed_dir,
            sample_ratio,
            seed,
        } => {
            let query = split.as_deref().map(|name| SplitQuery {
                name,
                processed_dir: &processed_dir,
                sample_ratio,
                seed,
            });
            commands::describe::run(&manifest, query)?;
            Ok(true)
        }
        Commands::Download { dataset, raw_dir } => {
            download::download_kaggle_dataset(&dataset, &raw_dir)?;
            println!("Download complete. Raw images under {}", raw_dir.display());
            Ok(true)
        }
    }
}
