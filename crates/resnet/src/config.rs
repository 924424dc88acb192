use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::MaxPool2dConfig;
use burn::nn::{BatchNormConfig, Initializer, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Config, Device};
use std::f64::consts::SQRT_2;
use crate::block::{BasicBlock, Downsample, LayerBlock};
use crate::resnet::ResNet;

fn kaiming() -> Initializer {
	Initializer::KaimingNormal {
		gain: SQRT_2, // recommended value for ReLU
		fan_out_only: true,
	}
}

struct BasicBlockConfig {
	conv1: Conv2dConfig,
	bn1: BatchNormConfig,
	conv2: Conv2dConfig,
	bn2: BatchNormConfig,
	downsample: Option<DownsampleConfig>,
}

impl BasicBlockConfig {
	fn new(in_channels: usize, out_channels: usize, stride: usize) -> Self {
		// conv3x3
		let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
			.with_stride([stride, stride])
			.with_padding(PaddingConfig2d::Explicit(1, 1))
			.with_bias(false);
		let bn1 = BatchNormConfig::new(out_channels);

		// conv3x3
		let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
			.with_stride([1, 1])
			.with_padding(PaddingConfig2d::Explicit(1, 1))
			.with_bias(false);
		let bn2 = BatchNormConfig::new(out_channels);

		let downsample = (in_channels != out_channels)
			.then(|| DownsampleConfig::new(in_channels, out_channels, stride));

		Self {
			conv1,
			bn1,
			conv2,
			bn2,
			downsample,
		}
	}

	/// Initialize a new [basic residual block](BasicBlock) module.
	fn init<B: Backend>(&self, device: &Device<B>) -> BasicBlock<B> {
		BasicBlock {
			conv1: self.conv1.clone().with_initializer(kaiming()).init(device),
			bn1: self.bn1.init(device),
			relu: Relu::new(),
			conv2: self.conv2.clone().with_initializer(kaiming()).init(device),
			bn2: self.bn2.init(device),
			downsample: self.downsample.as_ref().map(|d| d.init(device)),
		}
	}
}

struct DownsampleConfig {
	conv: Conv2dConfig,
	bn: BatchNormConfig,
}

impl DownsampleConfig {
	fn new(in_channels: usize, out_channels: usize, stride: usize) -> Self {
		// conv1x1
		let conv = Conv2dConfig::new([in_channels, out_channels], [1, 1])
			.with_stride([stride, stride])
			.with_padding(PaddingConfig2d::Explicit(0, 0))
			.with_bias(false);
		let bn = BatchNormConfig::new(out_channels);

		Self { conv, bn }
	}

	fn init<B: Backend>(&self, device: &B::Device) -> Downsample<B> {
		Downsample {
			conv: self.conv.clone().with_initializer(kaiming()).init(device),
			bn: self.bn.init(device),
		}
	}
}

#[derive(Config)]
pub struct LayerBlockConfig {
	num_blocks: usize,
	in_channels: usize,
	out_channels: usize,
	stride: usize,
}

impl LayerBlockConfig {
	pub fn init<B: Backend>(&self, device: &Device<B>) -> LayerBlock<B> {
		let blocks = (0..self.num_blocks)
			.map(|b| {
				if b == 0 {
					// First block uses the specified stride
					BasicBlockConfig::new(self.in_channels, self.out_channels, self.stride).init(device)
				} else {
					BasicBlockConfig::new(self.out_channels, self.out_channels, 1).init(device)
				}
			})
			.collect();

		LayerBlock { blocks }
	}
}

pub struct ResNetConfig {
	pub conv1: Conv2dConfig,
	pub bn1: BatchNormConfig,
	pub maxpool: MaxPool2dConfig,
	pub layer1: LayerBlockConfig,
	pub layer2: LayerBlockConfig,
	pub layer3: LayerBlockConfig,
	pub layer4: LayerBlockConfig,
}

impl ResNetConfig {
	pub fn new(blocks: [usize; 4]) -> Self {
		// 7x7 conv, 64, /2
		let conv1 = Conv2dConfig::new([3, 64], [7, 7])
			.with_stride([2, 2])
			.with_padding(PaddingConfig2d::Explicit(3, 3))
			.with_bias(false);
		let bn1 = BatchNormConfig::new(64);

		// 3x3 maxpool, /2
		let maxpool = MaxPool2dConfig::new([3, 3])
			.with_strides([2, 2])
			.with_padding(PaddingConfig2d::Explicit(1, 1));

		let layer1 = LayerBlockConfig::new(blocks[0], 64, 64, 1);
		let layer2 = LayerBlockConfig::new(blocks[1], 64, 128, 2);
		let layer3 = LayerBlockConfig::new(blocks[2], 128, 256, 2);
		let layer4 = LayerBlockConfig::new(blocks[3], 256, 512, 2);

		Self {
			conv1,
			bn1,
			maxpool,
			layer1,
			layer2,
			layer3,
			layer4,
		}
	}

	pub fn init<B: Backend>(self, device: &Device<B>) -> ResNet<B> {
		ResNet {
			conv1: self.conv1.with_initializer(kaiming()).init(device),
			bn1: self.bn1.init(device),
			relu: Relu::new(),
			maxpool: self.maxpool.init(),
			layer1: self.layer1.init(device),
			layer2: self.layer2.init(device),
			layer3: self.layer3.init(device),
			layer4: self.layer4.init(device),
		}
	}
}
