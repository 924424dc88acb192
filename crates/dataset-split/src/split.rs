use crate::error::SplitError;
use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub const TRAIN_SPLIT: &str = "train";
pub const TEST_SPLIT: &str = "test";

/// A `group/category` folder of the raw dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
	pub name: OsString,
	pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySplit {
	pub name: OsString,
	pub train: usize,
	pub test: usize,
}

pub fn is_image(path: &Path) -> bool {
	path.extension()
		.and_then(|ext| ext.to_str())
		.map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
		.unwrap_or(false)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, SplitError> {
	let mut entries = fs::read_dir(dir)?
		.map(|entry| entry.map(|entry| entry.path()))
		.collect::<Result<Vec<_>, _>>()?;
	entries.sort();

	Ok(entries)
}

/// Collects every category folder one level below each group folder of `raw_dir`.
pub fn find_categories<P: AsRef<Path>>(raw_dir: P) -> Result<Vec<Category>, SplitError> {
	let raw_dir = raw_dir.as_ref();
	if !raw_dir.is_dir() {
		return Err(SplitError::RawDirNotFound(raw_dir.to_path_buf()));
	}

	let mut categories = Vec::new();
	for group in sorted_entries(raw_dir)?.into_iter().filter(|path| path.is_dir()) {
		for path in sorted_entries(&group)?.into_iter().filter(|path| path.is_dir()) {
			if let Some(name) = path.file_name() {
				categories.push(Category { name: name.to_os_string(), path: path.clone() });
			}
		}
	}

	Ok(categories)
}

/// File names of the images directly inside `dir`.
pub fn list_images<P: AsRef<Path>>(dir: P) -> Result<Vec<OsString>, SplitError> {
	Ok(sorted_entries(dir.as_ref())?
		.into_iter()
		.filter(|path| path.is_file() && is_image(path))
		.filter_map(|path| path.file_name().map(|name| name.to_os_string()))
		.collect())
}

/// Shuffles `images` and cuts them at `floor(len * train_ratio)`.
pub fn partition<T, R: Rng + ?Sized>(mut images: Vec<T>, train_ratio: f64, rng: &mut R) -> (Vec<T>, Vec<T>) {
	images.shuffle(rng);
	let split_index = ((images.len() as f64) * train_ratio).floor() as usize;
	let test = images.split_off(split_index.min(images.len()));

	(images, test)
}

fn copy_into(source_dir: &Path, images: &[OsString], dest_dir: &Path) -> Result<(), SplitError> {
	fs::create_dir_all(dest_dir)?;

	for image in images {
		let from = source_dir.join(image);
		let to = dest_dir.join(image);
		fs::copy(&from, &to).map_err(|source| SplitError::Copy { from, to, source })?;
	}

	Ok(())
}

/// Copies every image of `raw_dir/<group>/<category>` into exactly one of
/// `dest_dir/train/<category>` and `dest_dir/test/<category>`.
///
/// Sources are never touched and nothing already in `dest_dir` is removed.
pub fn split_dataset<R: Rng + ?Sized>(
	raw_dir: &Path,
	dest_dir: &Path,
	train_ratio: f64,
	rng: &mut R,
) -> Result<Vec<CategorySplit>, SplitError> {
	if !(0.0..=1.0).contains(&train_ratio) {
		return Err(SplitError::InvalidRatio(train_ratio));
	}

	fs::create_dir_all(dest_dir)?;

	let categories = find_categories(raw_dir)?;
	info!(
		"Found categories: {:?}",
		categories.iter().map(|category| category.name.to_string_lossy()).collect::<Vec<_>>()
	);

	let mut splits = Vec::with_capacity(categories.len());
	for category in categories {
		let images = list_images(&category.path)?;
		let (train, test) = partition(images, train_ratio, rng);

		copy_into(&category.path, &train, &dest_dir.join(TRAIN_SPLIT).join(&category.name))?;
		copy_into(&category.path, &test, &dest_dir.join(TEST_SPLIT).join(&category.name))?;

		info!("{}: {} train, {} test", category.name.to_string_lossy(), train.len(), test.len());
		splits.push(CategorySplit { name: category.name, train: train.len(), test: test.len() });
	}

	Ok(splits)
}
