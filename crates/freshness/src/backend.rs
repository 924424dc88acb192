use burn::backend::Autodiff;
use burn_tch::{LibTorch, LibTorchDevice};
use log::{info, warn};

pub type InferenceBackend = LibTorch;
pub type TrainingBackend = Autodiff<LibTorch>;

/// CUDA device 0 when libtorch can see one, the CPU otherwise.
pub fn select_device() -> LibTorchDevice {
	if tch::utils::has_cuda() {
		info!("Using CUDA device 0");
		LibTorchDevice::Cuda(0)
	} else {
		warn!("No CUDA configuration detected, running on the CPU");
		LibTorchDevice::Cpu
	}
}
