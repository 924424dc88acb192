use burn::config::ConfigError;
use freshness::error::FreshnessError;
use thiserror::Error;

/// Startup failures. Per-request failures never leave the handlers.
#[derive(Debug, Error)]
pub enum ServeError {
	#[error("Could not load the model artifacts: {0}")]
	Artifacts(#[from] FreshnessError),
	#[error("Config error: {0:?}")]
	Config(ConfigError),
	#[error("Could not bind {address}: {message}")]
	Bind {
		address: String,
		message: String,
	},
	#[error("Logger already initialized")]
	Logger(#[from] log::SetLoggerError),
}

impl From<ConfigError> for ServeError {
	fn from(err: ConfigError) -> Self {
		Self::Config(err)
	}
}
