//! Reorganizes a raw `group/category/*.jpg` image dump into `dataset/{train,test}/<category>/`.

mod error;
mod split;

use crate::error::SplitError;
use clap::Parser;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, long_about = None)]
#[command(about = "Shuffles each raw image category into train/test splits")]
struct Args {
    /// Folder holding `<group>/<category>/<image>` files
    #[arg(long, default_value = "raw_dataset")]
    raw_dir: PathBuf,

    /// Folder receiving `train/` and `test/`
    #[arg(long, default_value = "dataset")]
    dest_dir: PathBuf,

    /// Fraction of every category copied into `train/`
    #[arg(long, default_value_t = 0.8)]
    train_ratio: f64,

    #[arg(long, default_value = "info")]
    log_level: LevelFilter,
}

fn main() -> Result<(), SplitError> {
    let args = Args::parse();
    SimpleLogger::new().with_level(args.log_level).init()?;

    let splits = split::split_dataset(&args.raw_dir, &args.dest_dir, args.train_ratio, &mut rand::thread_rng())?;

    let (train, test) = splits.iter().fold((0, 0), |(train, test), split| (train + split.train, test + split.test));
    info!("Dataset organized into {} categories ({train} train, {test} test images):", splits.len());
    info!("   {}/{}/... and {}/{}/...",
        args.dest_dir.display(), split::TRAIN_SPLIT,
        args.dest_dir.display(), split::TEST_SPLIT,
    );

    Ok(())
}
