use crate::augment::AugmentationConfig;
use crate::error::FreshnessError;
use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::{Backend, ElementConversion, Int};
use burn::tensor::{Tensor, TensorData};
use crate::vision;
use image::RgbImage;
use log::info;
use rand::thread_rng;
use rayon::prelude::*;
use std::fs::read_dir;
use std::path::{Path, PathBuf};

pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

pub fn is_image(path: &Path) -> bool {
	path.extension()
		.and_then(|ext| ext.to_str())
		.map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
		.unwrap_or(false)
}

/// Class names of a `root/<class>/*` folder, sorted. The position is the class index.
pub fn discover_classes<P: AsRef<Path>>(root: P) -> Result<Vec<String>, FreshnessError> {
	let root = root.as_ref();

	let mut classes = Vec::new();
	for entry in read_dir(root)? {
		let path = entry?.path();
		if path.is_dir() {
			if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
				classes.push(name.to_string());
			}
		}
	}
	classes.sort();

	if classes.is_empty() {
		return Err(FreshnessError::NoClasses(root.to_path_buf()));
	}

	Ok(classes)
}

#[derive(Debug, Clone)]
pub struct FreshnessItem {
	pub image: RgbImage,
	pub label: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FreshnessDataset {
	pub data: Vec<FreshnessItem>,
}

impl FreshnessDataset {
	/// Decodes every image below `root/<class>/`, resized to `image_size`.
	///
	/// Every subfolder of `root` must be one of `classes`.
	pub fn load<P: AsRef<Path>>(root: P, classes: &[String], image_size: u32) -> Result<Self, FreshnessError> {
		let root = root.as_ref();

		let mut files: Vec<(PathBuf, usize)> = Vec::new();
		for entry in read_dir(root)? {
			let class_dir = entry?.path();
			if !class_dir.is_dir() {
				continue;
			}

			let name = class_dir.file_name().and_then(|name| name.to_str()).unwrap_or_default();
			let label = classes
				.iter()
				.position(|class| class == name)
				.ok_or_else(|| FreshnessError::UnknownClass(name.to_string()))?;

			for entry in read_dir(&class_dir)? {
				let path = entry?.path();
				if path.is_file() && is_image(&path) {
					files.push((path, label));
				}
			}
		}
		files.sort();

		let data = files
			.par_iter()
			.map(|(path, label)| {
				let image = image::open(path).map_err(|source| FreshnessError::Image { path: path.clone(), source })?;

				let image = vision::resize(&image, image_size)
					.map_err(|source| FreshnessError::Vision { path: path.clone(), source })?;

				Ok(FreshnessItem { image, label: *label })
			})
			.collect::<Result<Vec<_>, FreshnessError>>()?;

		info!("Loaded {} images from {}", data.len(), root.display());

		Ok(Self { data })
	}

	pub fn count_per_class(&self, num_classes: usize) -> Vec<usize> {
		let mut counts = vec![0; num_classes];
		for item in &self.data {
			if let Some(count) = counts.get_mut(item.label) {
				*count += 1;
			}
		}
		counts
	}
}

impl Dataset<FreshnessItem> for FreshnessDataset {
	fn get(&self, index: usize) -> Option<FreshnessItem> {
		self.data.get(index).cloned()
	}

	fn len(&self) -> usize {
		self.data.len()
	}
}

/// `[H, W, 3]` pixels -> `[3, H, W]` tensor scaled to `[0, 1]`.
pub fn image_to_tensor<B: Backend>(image: RgbImage, device: &B::Device) -> Tensor<B, 3> {
	let (width, height) = image.dimensions();
	let data = TensorData::new(image.into_raw(), [height as usize, width as usize, 3]).convert::<B::FloatElem>();

	Tensor::<B, 3>::from_data(data, device).permute([2, 0, 1]) / 255
}

#[derive(Clone, Debug)]
pub struct FreshnessBatch<B: Backend> {
	pub images: Tensor<B, 4>,
	pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone)]
pub struct FreshnessBatcher<B: Backend> {
	device: B::Device,
	augmentation: Option<AugmentationConfig>,
}

impl<B: Backend> FreshnessBatcher<B> {
	pub fn new(device: B::Device) -> Self {
		Self { device, augmentation: None }
	}

	/// Re-samples `augmentation` for every item of every batch.
	pub fn with_augmentation(mut self, augmentation: AugmentationConfig) -> Self {
		self.augmentation = Some(augmentation);
		self
	}
}

impl<B: Backend> Batcher<FreshnessItem, FreshnessBatch<B>> for FreshnessBatcher<B> {
	fn batch(&self, items: Vec<FreshnessItem>) -> FreshnessBatch<B> {
		let mut rng = thread_rng();

		let targets = items
			.iter()
			.map(|item| {
				Tensor::<B, 1, Int>::from_data(
					TensorData::from([(item.label as i64).elem::<B::IntElem>()]),
					&self.device,
				)
			})
			.collect();

		let images = items
			.into_iter()
			.map(|item| match &self.augmentation {
				Some(augmentation) => augmentation.apply(&item.image, &mut rng),
				None => item.image,
			})
			.map(|image| image_to_tensor::<B>(image, &self.device))
			.collect();

		FreshnessBatch {
			images: Tensor::stack(images, 0),
			targets: Tensor::cat(targets, 0),
		}
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use burn::backend::NdArray;
	use image::Rgb;
	use std::fs;

	pub(crate) struct Scratch(pub PathBuf);

	impl Scratch {
		pub(crate) fn new(name: &str) -> Self {
			let path = std::env::temp_dir().join(format!("freshness-{name}-{}", std::process::id()));
			let _ = fs::remove_dir_all(&path);
			fs::create_dir_all(&path).unwrap();
			Self(path)
		}
	}

	impl Drop for Scratch {
		fn drop(&mut self) {
			let _ = fs::remove_dir_all(&self.0);
		}
	}

	fn write_png(path: &Path, width: u32, height: u32, shade: u8) {
		fs::create_dir_all(path.parent().unwrap()).unwrap();
		RgbImage::from_pixel(width, height, Rgb([shade, 0, 255 - shade])).save(path).unwrap();
	}

	#[test]
	fn classes_are_sorted_folder_names() {
		let scratch = Scratch::new("classes");
		for class in ["rottenbanana", "freshapples", "freshbanana"] {
			fs::create_dir_all(scratch.0.join(class)).unwrap();
		}
		fs::write(scratch.0.join("labels.txt"), "ignored").unwrap();

		assert_eq!(discover_classes(&scratch.0).unwrap(), vec!["freshapples", "freshbanana", "rottenbanana"]);
	}

	#[test]
	fn empty_root_has_no_classes() {
		let scratch = Scratch::new("no-classes");

		assert!(matches!(discover_classes(&scratch.0), Err(FreshnessError::NoClasses(_))));
	}

	#[test]
	fn load_resizes_and_labels_by_class_index() {
		let scratch = Scratch::new("load");
		write_png(&scratch.0.join("fresh").join("a.png"), 40, 30, 10);
		write_png(&scratch.0.join("fresh").join("b.PNG"), 12, 50, 20);
		write_png(&scratch.0.join("rotten").join("c.png"), 64, 64, 30);
		fs::write(scratch.0.join("rotten").join("notes.txt"), "skip").unwrap();

		let classes = vec!["fresh".to_string(), "rotten".to_string()];
		let dataset = FreshnessDataset::load(&scratch.0, &classes, 16).unwrap();

		assert_eq!(dataset.len(), 3);
		assert_eq!(dataset.count_per_class(2), vec![2, 1]);
		assert!(dataset.data.iter().all(|item| item.image.dimensions() == (16, 16)));
	}

	#[test]
	fn unknown_class_folder_is_rejected() {
		let scratch = Scratch::new("unknown");
		write_png(&scratch.0.join("mystery").join("a.png"), 8, 8, 0);

		let result = FreshnessDataset::load(&scratch.0, &["fresh".to_string()], 8);

		assert!(matches!(result, Err(FreshnessError::UnknownClass(name)) if name == "mystery"));
	}

	#[test]
	fn batch_stacks_channels_first_in_unit_range() {
		let device = Default::default();
		let batcher = FreshnessBatcher::<NdArray>::new(device);
		let items = vec![
			FreshnessItem { image: RgbImage::from_pixel(6, 4, Rgb([255, 0, 51])), label: 1 },
			FreshnessItem { image: RgbImage::from_pixel(6, 4, Rgb([0, 255, 0])), label: 0 },
		];

		let batch = batcher.batch(items);

		assert_eq!(batch.images.dims(), [2, 3, 4, 6]);
		let targets = batch.targets.into_data().convert::<i64>().to_vec::<i64>().unwrap();
		assert_eq!(targets, vec![1, 0]);

		let first = batch.images.slice([0..1, 0..3, 0..1, 0..1]).into_data().convert::<f32>().to_vec::<f32>().unwrap();
		assert!((first[0] - 1.0).abs() < 1e-6);
		assert!(first[1].abs() < 1e-6);
		assert!((first[2] - 0.2).abs() < 1e-6);
	}

	#[test]
	fn augmented_batch_keeps_shape() {
		let device = Default::default();
		let batcher = FreshnessBatcher::<NdArray>::new(device).with_augmentation(AugmentationConfig::new());
		let items = (0..3)
			.map(|label| FreshnessItem { image: RgbImage::from_pixel(8, 8, Rgb([label as u8 * 40, 9, 9])), label })
			.collect();

		assert_eq!(batcher.batch(items).images.dims(), [3, 3, 8, 8]);
	}
}
