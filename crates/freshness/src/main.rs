use burn::config::Config;
use clap::Parser;
use freshness::backend::{select_device, TrainingBackend};
use freshness::error::FreshnessError;
use freshness::train::{self, TrainingConfig, TrainingPaths};
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use std::path::PathBuf;
use std::time::SystemTime;

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(about = "Fine-tunes a pretrained ResNet-18 to tell fresh from rotten produce")]
struct Args {
    #[arg(long, default_value = "dataset/train")]
    train_dir: PathBuf,

    #[arg(long, default_value = "dataset/test")]
    test_dir: PathBuf,

    /// Receives the model, its config and classes.txt
    #[arg(long, default_value = "model")]
    artifact_dir: PathBuf,

    /// JSON training config, defaults are used when absent
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> Result<(), FreshnessError> {
    let args = Args::parse();
    SimpleLogger::new().with_level(args.log_level).init()?;

    let config = match &args.config {
        Some(path) => TrainingConfig::load(path)?,
        None => TrainingConfig::with_defaults(),
    };
    let paths = TrainingPaths {
        train_dir: args.train_dir,
        test_dir: args.test_dir,
        artifact_dir: args.artifact_dir,
    };

    let time = SystemTime::now();

    train::train::<TrainingBackend>(config, &paths, select_device())?;

    let elapsed = time.elapsed().map(|elapsed| elapsed.as_millis()).unwrap_or_default();
    info!("Time to train: {}", elapsed as f64 / 1000.0);

    Ok(())
}
