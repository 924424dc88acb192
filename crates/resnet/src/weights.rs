use std::fs::{self, create_dir_all, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use burn::data::network::downloader;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeightsError {
	#[error("Could not locate the home directory for the weights cache")]
	NoHomeDirectory,
	#[error("Weights cache I/O error: {0}")]
	Io(#[from] std::io::Error),
}

pub struct Weights {
	pub url: &'static str,
}

impl Weights {
	/// Downloads the weights into `~/.cache/freshness-resnet` unless they are already there.
	pub fn download(&self) -> Result<PathBuf, WeightsError> {
		let model_dir = dirs::home_dir()
			.ok_or(WeightsError::NoHomeDirectory)?
			.join(".cache")
			.join("freshness-resnet");

		if !model_dir.exists() {
			create_dir_all(&model_dir)?;
		}

		let file_base_name = self.url.rsplit_once('/').map_or(self.url, |(_, name)| name);
		let file_name = model_dir.join(file_base_name);
		if !file_name.exists() {
			let bytes = downloader::download_file_as_bytes(self.url, file_base_name);
			store(&bytes, &file_name)?;
		}

		Ok(file_name)
	}
}

/// Writes `bytes` next to `path` and renames it into place, so an interrupted write
/// never leaves a truncated file under the cached name.
fn store(bytes: &[u8], path: &Path) -> Result<(), WeightsError> {
	let partial = path.with_extension("part");

	let mut output_file = File::create(&partial)?;
	output_file.write_all(bytes)?;
	output_file.sync_all()?;
	fs::rename(&partial, path)?;

	Ok(())
}

pub trait WeightsMeta {
	fn weights(&self) -> Weights;
}

pub enum ResNet18 {
	/// These weights reproduce closely the results of the original paper.
	/// Top-1 accuracy: 69.758%.
	/// Top-5 accuracy: 89.078%.
	ImageNet1kV1,
}

impl WeightsMeta for ResNet18 {
	fn weights(&self) -> Weights {
		Weights {
			url: "https://download.pytorch.org/models/resnet18-f37072fd.pth",
		}
	}
}
