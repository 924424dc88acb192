use crate::artifact::{self, ClassMap};
use crate::augment::AugmentationConfig;
use crate::data::{discover_classes, FreshnessBatch, FreshnessBatcher, FreshnessDataset};
use crate::error::FreshnessError;
use crate::model::{FreshnessModel, FreshnessModelConfig};
use burn::config::Config;
use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::optim::AdamConfig;
use burn::record::CompactRecorder;
use burn::tensor::backend::AutodiffBackend;
use burn::train::metric::{AccuracyMetric, CpuUse, CudaMetric, LossMetric};
use burn::train::LearnerBuilder;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Config, Debug)]
pub struct TrainingConfig {
	pub model: FreshnessModelConfig,
	pub optimizer: AdamConfig,
	#[config(default = "AugmentationConfig::new()")]
	pub augmentation: AugmentationConfig,
	#[config(default = 224)]
	pub image_size: u32,
	#[config(default = 32)]
	pub batch_size: usize,
	#[config(default = 4)]
	pub num_workers: usize,
	#[config(default = 42)]
	pub seed: u64,
	#[config(default = 10)]
	pub head_epochs: usize,
	#[config(default = 1e-4)]
	pub head_learning_rate: f64,
	#[config(default = 5)]
	pub fine_tune_epochs: usize,
	#[config(default = 1e-5)]
	pub fine_tune_learning_rate: f64,
	/// Backbone layers, counted from the output side, trained in the second phase.
	#[config(default = 30)]
	pub fine_tune_layers: usize,
}

impl TrainingConfig {
	pub fn with_defaults() -> Self {
		Self::new(FreshnessModelConfig::new(0), AdamConfig::new())
	}
}

#[derive(Debug, Clone)]
pub struct TrainingPaths {
	pub train_dir: PathBuf,
	pub test_dir: PathBuf,
	pub artifact_dir: PathBuf,
}

/// Trains the head on a frozen backbone, then fine-tunes the top of the backbone, then
/// writes the model, its config and the class map into the artifact directory.
pub fn train<B: AutodiffBackend>(mut config: TrainingConfig, paths: &TrainingPaths, device: B::Device) -> Result<FreshnessModel<B>, FreshnessError> {
	let classes = discover_classes(&paths.train_dir)?;
	info!("Classes: {classes:?}");
	config.model.num_classes = classes.len();

	let train_data = FreshnessDataset::load(&paths.train_dir, &classes, config.image_size)?;
	let test_data = FreshnessDataset::load(&paths.test_dir, &classes, config.image_size)?;
	for (class, (train, test)) in classes
		.iter()
		.zip(train_data.count_per_class(classes.len()).into_iter().zip(test_data.count_per_class(classes.len())))
	{
		info!("{class}: {train} train, {test} test");
	}

	std::fs::create_dir_all(&paths.artifact_dir)?;

	B::seed(config.seed);

	// Dataloaders
	let batcher_train = FreshnessBatcher::<B>::new(device.clone()).with_augmentation(config.augmentation.clone());
	let batcher_valid = FreshnessBatcher::<B::InnerBackend>::new(device.clone());

	let dataloader_train = DataLoaderBuilder::new(batcher_train)
		.batch_size(config.batch_size)
		.shuffle(config.seed)
		.num_workers(config.num_workers)
		.build(Arc::new(train_data));

	let dataloader_test = DataLoaderBuilder::new(batcher_valid)
		.batch_size(config.batch_size)
		.num_workers(config.num_workers)
		.build(Arc::new(test_data));

	let model = config.model.init_pretrained::<B>(&device)?.freeze_backbone();

	let phases = artifact_phase_dirs(&paths.artifact_dir);

	info!("Training the classification head");
	let model = fit_phase(
		&phases[0],
		model,
		&config,
		config.head_epochs,
		config.head_learning_rate,
		&device,
		dataloader_train.clone(),
		dataloader_test.clone(),
	);

	let model = model.unfreeze_top(config.fine_tune_layers, &device);
	let (trainable, total) = model.backbone_layers();
	info!("Fine-tuning {trainable} of {total} backbone layers");

	let model = fit_phase(
		&phases[1],
		model,
		&config,
		config.fine_tune_epochs,
		config.fine_tune_learning_rate,
		&device,
		dataloader_train,
		dataloader_test,
	);

	artifact::save_artifacts(&paths.artifact_dir, model.clone(), &config, &ClassMap::new(classes))?;
	info!("Saved model to {}", paths.artifact_dir.display());

	Ok(model)
}

fn artifact_phase_dirs(artifact_dir: &std::path::Path) -> [String; 2] {
	["phase-1-head", "phase-2-fine-tune"].map(|phase| artifact_dir.join(phase).to_string_lossy().into_owned())
}

#[allow(clippy::too_many_arguments)]
fn fit_phase<B: AutodiffBackend>(
	directory: &str,
	model: FreshnessModel<B>,
	config: &TrainingConfig,
	num_epochs: usize,
	learning_rate: f64,
	device: &B::Device,
	dataloader_train: Arc<dyn DataLoader<FreshnessBatch<B>>>,
	dataloader_test: Arc<dyn DataLoader<FreshnessBatch<B::InnerBackend>>>,
) -> FreshnessModel<B> {
	if num_epochs == 0 {
		return model;
	}

	// Learner config
	let learner = LearnerBuilder::new(directory)
		.metric_train_numeric(AccuracyMetric::new())
		.metric_valid_numeric(AccuracyMetric::new())

		.metric_train_numeric(LossMetric::new())
		.metric_valid_numeric(LossMetric::new())

		.metric_train(CudaMetric::new())
		.metric_train(CpuUse::new())

		.with_file_checkpointer(CompactRecorder::new())
		// simple_logger already owns the `log` facade
		.with_application_logger(None)

		.devices(vec![device.clone()])
		.num_epochs(num_epochs)
		.summary()
		.build(model, config.optimizer.init(), learning_rate);

	let now = Instant::now();
	let model_trained = learner.fit(dataloader_train, dataloader_test);
	let elapsed = now.elapsed().as_secs();
	info!("Phase completed in {}m{}s", elapsed / 60, elapsed % 60);

	model_trained
}
