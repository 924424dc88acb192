use crate::data::FreshnessBatch;
use burn::config::Config;
use burn::module::{AutodiffModule, Module};
use burn::nn::loss::CrossEntropyLossConfig;
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu};
use burn::prelude::{Backend, Int, Tensor};
use burn::record::RecorderError;
use burn::tensor::backend::AutodiffBackend;
use burn::train::{ClassificationOutput, TrainOutput, TrainStep, ValidStep};
use resnet::{ResNet, ResNet18, FEATURE_CHANNELS};

// ImageNet statistics the pretrained backbone was trained with
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// ResNet-18 backbone with a small dense classification head.
///
/// Takes `[batch, 3, H, W]` images scaled to `[0, 1]` and returns one logit per class.
#[derive(Debug, Module)]
pub struct FreshnessModel<B: Backend> {
	backbone: ResNet<B>,
	pool: AdaptiveAvgPool2d,
	dropout: Dropout,
	hidden: Linear<B>,
	activation: Relu,
	output: Linear<B>,
}

fn normalize<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
	let device = images.device();
	let mean = Tensor::<B, 1>::from_floats(MEAN, &device).reshape([1, 3, 1, 1]);
	let std = Tensor::<B, 1>::from_floats(STD, &device).reshape([1, 3, 1, 1]);

	(images - mean) / std
}

fn classification<B: Backend>(output: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> ClassificationOutput<B> {
	let loss = CrossEntropyLossConfig::new().init(&output.device())
		.forward(output.clone(), targets.clone());

	ClassificationOutput::new(loss, output, targets)
}

impl<B: Backend> FreshnessModel<B> {
	pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
		let features = self.backbone.forward(normalize(images));
		self.head(features)
	}

	fn head(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
		let x = self.pool.forward(features);
		let x = x.flatten(1, 3);

		let x = self.dropout.forward(x);
		let x = self.hidden.forward(x);
		let x = self.activation.forward(x);
		let x = self.dropout.forward(x);

		self.output.forward(x)
	}

	pub fn forward_classification(&self, images: Tensor<B, 4>, targets: Tensor<B, 1, Int>) -> ClassificationOutput<B> {
		classification(self.forward(images), targets)
	}

	/// Stops gradient tracking for the whole backbone; only the head trains.
	pub fn freeze_backbone(self) -> Self {
		Self {
			backbone: self.backbone.no_grad(),
			..self
		}
	}

	/// Makes the last `trainable` backbone layers trainable again and keeps the rest frozen.
	pub fn unfreeze_top(self, trainable: usize, device: &B::Device) -> Self {
		let layers = self.backbone.layer_count();

		// A fresh backbone tracks gradients everywhere; loading a record keeps that setting.
		let backbone = ResNet::resnet18(device)
			.load_record(self.backbone.into_record())
			.freeze_leading(layers.saturating_sub(trainable));

		Self { backbone, ..self }
	}

	/// `(trainable, total)` parameterized backbone layers.
	pub fn backbone_layers(&self) -> (usize, usize) {
		(self.backbone.trainable_layer_count(), self.backbone.layer_count())
	}
}

impl<B: AutodiffBackend> FreshnessModel<B> {
	/// A fully frozen backbone runs outside the autodiff graph in inference mode,
	/// so its batch norm layers keep their pretrained running statistics.
	pub fn forward_train(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
		if self.backbone.trainable_layer_count() > 0 {
			return self.forward(images);
		}

		let features = self.backbone.valid().forward(normalize(images.inner()));
		self.head(Tensor::from_inner(features))
	}
}

impl<B: AutodiffBackend> TrainStep<FreshnessBatch<B>, ClassificationOutput<B>> for FreshnessModel<B> {
	fn step(&self, batch: FreshnessBatch<B>) -> TrainOutput<ClassificationOutput<B>> {
		let item = classification(self.forward_train(batch.images), batch.targets);

		TrainOutput::new(self, item.loss.backward(), item)
	}
}

impl<B: Backend> ValidStep<FreshnessBatch<B>, ClassificationOutput<B>> for FreshnessModel<B> {
	fn step(&self, batch: FreshnessBatch<B>) -> ClassificationOutput<B> {
		self.forward_classification(batch.images, batch.targets)
	}
}

#[derive(Debug, Config)]
pub struct FreshnessModelConfig {
	pub num_classes: usize,
	#[config(default = 128)]
	pub hidden_size: usize,
	#[config(default = 0.3)]
	pub dropout: f64,
}

impl FreshnessModelConfig {
	/// Randomly initialized weights, to be replaced by a saved record.
	pub fn init<B: Backend>(&self, device: &B::Device) -> FreshnessModel<B> {
		self.with_backbone(ResNet::resnet18(device), device)
	}

	/// Backbone with ImageNet weights, head randomly initialized.
	pub fn init_pretrained<B: Backend>(&self, device: &B::Device) -> Result<FreshnessModel<B>, RecorderError> {
		let backbone = ResNet::resnet18_pretrained(ResNet18::ImageNet1kV1, device)?;

		Ok(self.with_backbone(backbone, device))
	}

	fn with_backbone<B: Backend>(&self, backbone: ResNet<B>, device: &B::Device) -> FreshnessModel<B> {
		FreshnessModel {
			backbone,
			pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
			dropout: DropoutConfig::new(self.dropout).init(),
			hidden: LinearConfig::new(FEATURE_CHANNELS, self.hidden_size).init(device),
			activation: Relu::new(),
			output: LinearConfig::new(self.hidden_size, self.num_classes).init(device),
		}
	}
}
