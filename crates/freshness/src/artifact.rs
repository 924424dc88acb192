//! Files the trainer leaves behind for the server.

use crate::error::FreshnessError;
use crate::model::FreshnessModel;
use crate::train::TrainingConfig;
use burn::config::Config;
use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{CompactRecorder, FileRecorder};
use std::fs;
use std::path::{Path, PathBuf};

pub const MODEL_FILE: &str = "model";
pub const CONFIG_FILE: &str = "config.json";
pub const CLASSES_FILE: &str = "classes.txt";
const STAGING_DIR: &str = ".staging";

pub fn model_path(artifact_dir: &Path) -> PathBuf {
	artifact_dir.join(MODEL_FILE)
}

pub fn config_path(artifact_dir: &Path) -> PathBuf {
	artifact_dir.join(CONFIG_FILE)
}

pub fn classes_path(artifact_dir: &Path) -> PathBuf {
	artifact_dir.join(CLASSES_FILE)
}

/// Class index -> class name, stored as one `index:name` line per class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMap {
	names: Vec<String>,
}

impl ClassMap {
	pub fn new(names: Vec<String>) -> Self {
		Self { names }
	}

	pub fn len(&self) -> usize {
		self.names.len()
	}

	pub fn is_empty(&self) -> bool {
		self.names.is_empty()
	}

	pub fn name(&self, index: usize) -> Option<&str> {
		self.names.get(index).map(String::as_str)
	}

	pub fn names(&self) -> &[String] {
		&self.names
	}

	/// Lines may come in any order but the indices must be exactly `0..n`.
	pub fn parse(content: &str) -> Result<Self, FreshnessError> {
		let mut entries = Vec::new();

		for (number, line) in content.lines().enumerate() {
			let line = line.trim();
			if line.is_empty() {
				continue;
			}

			let malformed = || FreshnessError::ClassMap { line: number + 1, content: line.to_string() };
			let (index, name) = line.split_once(':').ok_or_else(malformed)?;
			let index: usize = index.trim().parse().map_err(|_| malformed())?;
			let name = name.trim();
			if name.is_empty() {
				return Err(malformed());
			}

			entries.push((index, name.to_string(), number + 1));
		}

		entries.sort_by_key(|(index, _, _)| *index);

		let mut names = Vec::with_capacity(entries.len());
		for (expected, (index, name, number)) in entries.into_iter().enumerate() {
			if index != expected {
				return Err(FreshnessError::ClassMap { line: number, content: format!("{index}:{name}") });
			}
			names.push(name);
		}

		Ok(Self { names })
	}

	pub fn to_lines(&self) -> String {
		self.names
			.iter()
			.enumerate()
			.map(|(index, name)| format!("{index}:{name}\n"))
			.collect()
	}

	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FreshnessError> {
		Self::parse(&fs::read_to_string(path)?)
	}

	pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), FreshnessError> {
		fs::write(path, self.to_lines())?;
		Ok(())
	}
}

fn record_file<B: Backend>() -> String {
	format!("{MODEL_FILE}.{}", <CompactRecorder as FileRecorder<B>>::file_extension())
}

/// Writes the model, class map and config into a staging folder, then moves them into
/// `artifact_dir` with the config last. A failed save leaves the previous artifacts alone.
pub fn save_artifacts<B: Backend>(
	artifact_dir: &Path,
	model: FreshnessModel<B>,
	config: &TrainingConfig,
	classes: &ClassMap,
) -> Result<(), FreshnessError> {
	let staging = artifact_dir.join(STAGING_DIR);
	fs::create_dir_all(&staging)?;

	model.save_file(model_path(&staging), &CompactRecorder::new())?;
	classes.save(classes_path(&staging))?;
	config.save(config_path(&staging))?;

	for file in [record_file::<B>().as_str(), CLASSES_FILE, CONFIG_FILE] {
		fs::rename(staging.join(file), artifact_dir.join(file))?;
	}
	fs::remove_dir(&staging)?;

	Ok(())
}

/// Restores the trained model and its class map from `artifact_dir`.
pub fn load_model<B: Backend>(artifact_dir: &Path, device: &B::Device) -> Result<(FreshnessModel<B>, ClassMap), FreshnessError> {
	let config = TrainingConfig::load(config_path(artifact_dir))?;
	let classes = ClassMap::load(classes_path(artifact_dir))?;

	if classes.len() != config.model.num_classes {
		return Err(FreshnessError::ClassCount {
			classes: classes.len(),
			outputs: config.model.num_classes,
		});
	}

	let model = config
		.model
		.init::<B>(device)
		.load_file(model_path(artifact_dir), &CompactRecorder::new(), device)?;

	Ok((model, classes))
}
