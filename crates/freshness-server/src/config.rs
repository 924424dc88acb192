use burn::config::Config;
use freshness::infer::PipelineConfig;

#[derive(Config, Debug)]
pub struct ServeConfig {
	#[config(default = "String::from(\"127.0.0.1:5000\")")]
	pub address: String,
	/// Folder holding `model.mpk`, `config.json` and `classes.txt`.
	#[config(default = "String::from(\"model\")")]
	pub artifact_dir: String,
	/// Threads pulling requests off the listener.
	#[config(default = 4)]
	pub workers: usize,
	/// Threads running the model.
	#[config(default = 1)]
	pub inference_threads: usize,
	/// Requests allowed to wait for an inference thread before new ones are turned away.
	#[config(default = 4)]
	pub inference_queue: usize,
	#[config(default = 30)]
	pub predict_timeout_secs: u64,
	#[config(default = "PipelineConfig::new()")]
	pub pipeline: PipelineConfig,
}
