use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SplitError {
	#[error("Raw dataset folder not found: {0}")]
	RawDirNotFound(PathBuf),
	#[error("Train ratio must be within [0, 1], got {0}")]
	InvalidRatio(f64),
	#[error("Std IO error: {0}")]
	StdIoError(#[from] std::io::Error),
	#[error("Could not copy {from} to {to}: {source}")]
	Copy {
		from: PathBuf,
		to: PathBuf,
		source: std::io::Error,
	},
	#[error("Logger already initialized")]
	Logger(#[from] log::SetLoggerError),
}
