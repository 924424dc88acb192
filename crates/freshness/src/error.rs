use std::path::PathBuf;
use std::time::Duration;
use burn::config::ConfigError;
use burn::record::RecorderError;
use thiserror::Error;

/// Failures of the offline jobs and of artifact loading. None of them are recovered.
#[derive(Debug, Error)]
pub enum FreshnessError {
	#[error("Std IO error: {0}")]
	StdIoError(#[from] std::io::Error),
	#[error("Could not read image {path}: {source}")]
	Image {
		path: PathBuf,
		source: image::ImageError,
	},
	#[error("Could not resize image {path}: {source}")]
	Vision {
		path: PathBuf,
		source: opencv::Error,
	},
	#[error("Config error: {0:?}")]
	Config(ConfigError),
	#[error("Model record error: {0:?}")]
	Recorder(RecorderError),
	#[error("No class folders found in {0}")]
	NoClasses(PathBuf),
	#[error("Folder {0:?} is not one of the training classes")]
	UnknownClass(String),
	#[error("Malformed class map line {line}: {content:?}")]
	ClassMap {
		line: usize,
		content: String,
	},
	#[error("Class map has {classes} classes but the model was trained for {outputs}")]
	ClassCount {
		classes: usize,
		outputs: usize,
	},
	#[error("Logger already initialized")]
	Logger(#[from] log::SetLoggerError),
}

impl From<ConfigError> for FreshnessError {
	fn from(err: ConfigError) -> Self {
		Self::Config(err)
	}
}

impl From<RecorderError> for FreshnessError {
	fn from(err: RecorderError) -> Self {
		Self::Recorder(err)
	}
}

/// The request could not be turned into an image.
#[derive(Debug, Error)]
pub enum DecodeError {
	#[error("Image data has no ',' separating the header from the payload")]
	MissingPayload,
	#[error("Invalid base64 payload: {0}")]
	Base64(#[from] base64::DecodeError),
	#[error("Unreadable image: {0}")]
	Image(#[from] image::ImageError),
	#[error("Could not resize image: {0}")]
	Resize(#[from] opencv::Error),
}

/// The model could not produce a usable answer.
#[derive(Debug, Error)]
pub enum InferenceError {
	#[error("Model returned no scores")]
	EmptyScores,
	#[error("Model returned a non-finite score")]
	NonFinite,
	#[error("Model returned {scores} scores for {classes} classes")]
	ClassCount {
		scores: usize,
		classes: usize,
	},
	#[error("Tensor conversion failed: {0}")]
	Tensor(String),
	#[error("Sharpness check failed: {0}")]
	Sharpness(#[from] opencv::Error),
	#[error("Prediction queue is full")]
	Busy,
	#[error("Prediction panicked")]
	Panicked,
	#[error("Prediction timed out after {0:?}")]
	Timeout(Duration),
	#[error("Prediction worker stopped without answering")]
	Disconnected,
}

#[derive(Debug, Error)]
pub enum PredictError {
	#[error(transparent)]
	Decode(#[from] DecodeError),
	#[error(transparent)]
	Inference(#[from] InferenceError),
}
