use burn::module::Module;
use burn::nn::conv::Conv2d;
use burn::nn::pool::MaxPool2d;
use burn::nn::{BatchNorm, Relu};
use burn::prelude::{Backend, Device};
use burn::record::{FullPrecisionSettings, Recorder, RecorderError};
use burn::tensor::Tensor;
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use log::info;
use crate::block::{bn_trainable, conv_trainable, freeze, LayerBlock};
use crate::config::ResNetConfig;
use crate::weights::{self, Weights, WeightsMeta};

const RESNET18_BLOCKS: [usize; 4] = [2, 2, 2, 2];

/// Channels of the feature map returned by [`ResNet::forward`].
pub const FEATURE_CHANNELS: usize = 512;

#[derive(Debug, Module)]
pub struct ResNet<B: Backend> {
	pub(crate) conv1: Conv2d<B>,
	pub(crate) bn1: BatchNorm<B, 2>,
	pub(crate) relu: Relu,
	pub(crate) maxpool: MaxPool2d,
	pub(crate) layer1: LayerBlock<B>,
	pub(crate) layer2: LayerBlock<B>,
	pub(crate) layer3: LayerBlock<B>,
	pub(crate) layer4: LayerBlock<B>,
}

impl<B: Backend> ResNet<B> {
	/// `[batch, 3, H, W]` -> `[batch, 512, H / 32, W / 32]`
	pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
		let x = self.conv1.forward(input);
		let x = self.bn1.forward(x);
		let x = self.relu.forward(x);
		let x = self.maxpool.forward(x);

		let x = self.layer1.forward(x);
		let x = self.layer2.forward(x);
		let x = self.layer3.forward(x);
		self.layer4.forward(x)
	}

	pub fn resnet18(device: &Device<B>) -> Self {
		ResNetConfig::new(RESNET18_BLOCKS).init(device)
	}

	pub fn resnet18_pretrained(weights: weights::ResNet18, device: &Device<B>) -> Result<Self, RecorderError> {
		let weights = weights.weights();
		let record = Self::load_weights_record(&weights, device)?;

		Ok(Self::resnet18(device).load_record(record))
	}

	pub fn load_weights_record(weights: &Weights, device: &Device<B>) -> Result<ResNetRecord<B>, RecorderError> {
		let torch_weights = weights.download().map_err(|err| {
			RecorderError::Unknown(format!("Could not download weights.\nError: {err}"))
		})?;
		info!("Loading backbone weights from {}", torch_weights.display());

		// The torchvision `fc.*` entries have no counterpart here and are skipped.
		let load_args = LoadArgs::new(torch_weights)
			// Map *.downsample.0.* -> *.downsample.conv.*
			.with_key_remap("(.+)\\.downsample\\.0\\.(.+)", "$1.downsample.conv.$2")
			// Map *.downsample.1.* -> *.downsample.bn.*
			.with_key_remap("(.+)\\.downsample\\.1\\.(.+)", "$1.downsample.bn.$2")
			// Map layer[i].[j].* -> layer[i].blocks.[j].*
			.with_key_remap("(layer[1-4])\\.([0-9]+)\\.(.+)", "$1.blocks.$2.$3");

		PyTorchFileRecorder::<FullPrecisionSettings>::new().load(load_args, device)
	}

	/// Stops gradient tracking for the first `count` parameterized layers, in forward order
	/// (convolutions and batch norms, the downsample path after its block's main path).
	/// Layers past `count` keep their current setting.
	pub fn freeze_leading(self, count: usize) -> Self {
		let mut remaining = count;

		Self {
			conv1: freeze::<B, _>(self.conv1, &mut remaining),
			bn1: freeze::<B, _>(self.bn1, &mut remaining),
			relu: self.relu,
			maxpool: self.maxpool,
			layer1: self.layer1.freeze_leading(&mut remaining),
			layer2: self.layer2.freeze_leading(&mut remaining),
			layer3: self.layer3.freeze_leading(&mut remaining),
			layer4: self.layer4.freeze_leading(&mut remaining),
		}
	}

	/// Whether each parameterized layer requires gradients, in the order used by
	/// [`ResNet::freeze_leading`].
	pub fn trainable_flags(&self) -> Vec<bool> {
		let mut flags = vec![conv_trainable(&self.conv1), bn_trainable(&self.bn1)];

		self.layer1.trainable_flags(&mut flags);
		self.layer2.trainable_flags(&mut flags);
		self.layer3.trainable_flags(&mut flags);
		self.layer4.trainable_flags(&mut flags);

		flags
	}

	pub fn layer_count(&self) -> usize {
		self.trainable_flags().len()
	}

	pub fn trainable_layer_count(&self) -> usize {
		self.trainable_flags().into_iter().filter(|trainable| *trainable).count()
	}
}
