//! ResNet-18 feature extractor backed by the torchvision ImageNet weights.
//!
//! The classification layer of the original network is dropped: [`ResNet::forward`]
//! returns the last feature map so callers can attach their own head. Layers can be
//! frozen front to back with [`ResNet::freeze_leading`] for transfer learning.

mod block;
mod config;
mod resnet;
pub mod weights;

pub use crate::resnet::{ResNet, ResNetRecord, FEATURE_CHANNELS};
pub use crate::weights::{ResNet18, Weights, WeightsError, WeightsMeta};
