use burn::nn::conv::Conv2d;
use burn::nn::{BatchNorm, Relu};
use burn::prelude::{Backend, Module, Tensor};

/// Freezes `module` while there are still layers left to freeze.
pub(crate) fn freeze<B: Backend, M: Module<B>>(module: M, remaining: &mut usize) -> M {
	if *remaining == 0 {
		return module;
	}

	*remaining -= 1;
	module.no_grad()
}

pub(crate) fn conv_trainable<B: Backend>(conv: &Conv2d<B>) -> bool {
	conv.weight.val().is_require_grad()
}

pub(crate) fn bn_trainable<B: Backend>(bn: &BatchNorm<B, 2>) -> bool {
	bn.gamma.val().is_require_grad()
}

#[derive(Debug, Module)]
pub struct BasicBlock<B: Backend> {
	pub(crate) conv1: Conv2d<B>,
	pub(crate) conv2: Conv2d<B>,
	pub(crate) bn1: BatchNorm<B, 2>,
	pub(crate) bn2: BatchNorm<B, 2>,
	pub(crate) relu: Relu,
	pub(crate) downsample: Option<Downsample<B>>
}

impl<B: Backend> BasicBlock<B> {
	pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
		let identity = input.clone();

		let x = self.conv1.forward(input);
		let x = self.bn1.forward(x);
		let x = self.relu.forward(x);

		let x = self.conv2.forward(x);
		let x = self.bn2.forward(x);

		// skip
		let x = match &self.downsample {
			Some(downsample) => x + downsample.forward(&identity),
			None => x + identity
		};

		self.relu.forward(x)
	}

	pub(crate) fn freeze_leading(self, remaining: &mut usize) -> Self {
		Self {
			conv1: freeze::<B, _>(self.conv1, remaining),
			bn1: freeze::<B, _>(self.bn1, remaining),
			conv2: freeze::<B, _>(self.conv2, remaining),
			bn2: freeze::<B, _>(self.bn2, remaining),
			relu: self.relu,
			downsample: self.downsample.map(|downsample| downsample.freeze_leading(remaining)),
		}
	}

	pub(crate) fn trainable_flags(&self, flags: &mut Vec<bool>) {
		flags.push(conv_trainable(&self.conv1));
		flags.push(bn_trainable(&self.bn1));
		flags.push(conv_trainable(&self.conv2));
		flags.push(bn_trainable(&self.bn2));

		if let Some(downsample) = &self.downsample {
			downsample.trainable_flags(flags);
		}
	}
}

#[derive(Debug, Module)]
pub struct Downsample<B: Backend> {
	pub(crate) conv: Conv2d<B>,
	pub(crate) bn: BatchNorm<B, 2>
}

impl<B: Backend> Downsample<B> {
	pub fn forward(&self, input: &Tensor<B, 4>) -> Tensor<B, 4> {
		let x = self.conv.forward(input.clone());
		self.bn.forward(x)
	}

	fn freeze_leading(self, remaining: &mut usize) -> Self {
		Self {
			conv: freeze::<B, _>(self.conv, remaining),
			bn: freeze::<B, _>(self.bn, remaining),
		}
	}

	fn trainable_flags(&self, flags: &mut Vec<bool>) {
		flags.push(conv_trainable(&self.conv));
		flags.push(bn_trainable(&self.bn));
	}
}

#[derive(Debug, Module)]
pub struct LayerBlock<B: Backend> {
	pub(crate) blocks: Vec<BasicBlock<B>>
}

impl<B: Backend> LayerBlock<B> {
	pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
		let mut x = input;
		for block in &self.blocks {
			x = block.forward(x);
		}
		x
	}

	pub(crate) fn freeze_leading(self, remaining: &mut usize) -> Self {
		Self {
			blocks: self.blocks
				.into_iter()
				.map(|block| block.freeze_leading(remaining))
				.collect(),
		}
	}

	pub(crate) fn trainable_flags(&self, flags: &mut Vec<bool>) {
		for block in &self.blocks {
			block.trainable_flags(flags);
		}
	}
}
