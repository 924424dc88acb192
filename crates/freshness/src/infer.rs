use crate::artifact::ClassMap;
use crate::blur;
use crate::error::{DecodeError, InferenceError, PredictError};
use crate::model::FreshnessModel;
use crate::vision;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use burn::config::Config;
use burn::prelude::Backend;
use burn::tensor::activation::{sigmoid, softmax};
use burn::tensor::{Tensor, TensorData};
use image::RgbImage;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Labels reported for a single-score model, in score order.
pub const FRESHNESS_LABELS: [Freshness; 2] = [Freshness::Fresh, Freshness::Rotten];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
	Fresh,
	Rotten,
}

impl Freshness {
	/// Any class whose folder name mentions "rotten" counts as rotten.
	pub fn from_class_name(name: &str) -> Self {
		if name.to_ascii_lowercase().contains("rotten") {
			Self::Rotten
		} else {
			Self::Fresh
		}
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Fresh => "Fresh",
			Self::Rotten => "Rotten",
		}
	}
}

impl fmt::Display for Freshness {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// How raw model scores become a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelRule {
	/// One score is a rotten probability, several are per-class probabilities.
	Auto,
	/// Rounds the first score whatever the output width.
	RoundFirst,
}

#[derive(Config, Debug)]
pub struct PipelineConfig {
	#[config(default = 224)]
	pub image_size: u32,
	/// Images whose Laplacian variance is strictly below this are rejected.
	#[config(default = 120.0)]
	pub blur_threshold: f64,
	#[config(default = "LabelRule::Auto")]
	pub label_rule: LabelRule,
}

/// Anything that scores a square image.
///
/// `pixels` holds `size * size * 3` values in row-major `[H, W, C]` order scaled to `[0, 1]`.
pub trait Classifier: Send + Sync {
	fn classify(&self, pixels: Vec<f32>, size: usize) -> Result<Vec<f32>, InferenceError>;
}

/// Runs a trained [`FreshnessModel`] one request at a time.
pub struct BurnClassifier<B: Backend> {
	model: Mutex<FreshnessModel<B>>,
	device: B::Device,
}

impl<B: Backend> BurnClassifier<B> {
	pub fn new(model: FreshnessModel<B>, device: B::Device) -> Self {
		Self { model: Mutex::new(model), device }
	}
}

impl<B: Backend> Classifier for BurnClassifier<B> {
	fn classify(&self, pixels: Vec<f32>, size: usize) -> Result<Vec<f32>, InferenceError> {
		let data = TensorData::new(pixels, [1, size, size, 3]).convert::<B::FloatElem>();
		let images = Tensor::<B, 4>::from_data(data, &self.device).permute([0, 3, 1, 2]);

		let logits = {
			// the model is never mutated after loading, a panicked forward leaves it intact
			let model = self.model.lock().unwrap_or_else(|poisoned| {
				warn!("Recovering the model lock after a panicked prediction");
				self.model.clear_poison();
				PoisonError::into_inner(poisoned)
			});
			model.forward(images)
		};

		let scores = if logits.dims()[1] == 1 { sigmoid(logits) } else { softmax(logits, 1) };

		scores
			.into_data()
			.convert::<f32>()
			.to_vec::<f32>()
			.map_err(|err| InferenceError::Tensor(format!("{err:?}")))
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
	Label(Freshness),
	Blurry { variance: f64 },
}

/// Decode, resize, blur gate, classify, label.
pub struct Pipeline<C: Classifier> {
	classifier: C,
	classes: ClassMap,
	config: PipelineConfig,
}

impl<C: Classifier> Pipeline<C> {
	pub fn new(classifier: C, classes: ClassMap, config: PipelineConfig) -> Self {
		Self { classifier, classes, config }
	}

	pub fn config(&self) -> &PipelineConfig {
		&self.config
	}

	pub fn classes(&self) -> &ClassMap {
		&self.classes
	}

	/// `data_url` is anything of the form `<header>,<base64 image>`.
	pub fn predict(&self, data_url: &str) -> Result<Outcome, PredictError> {
		let image = decode_image(data_url, self.config.image_size)?;

		let variance = blur::laplacian_variance(&image).map_err(InferenceError::Sharpness)?;
		if variance < self.config.blur_threshold {
			debug!("Rejected blurry image, variance {variance:.2}");
			return Ok(Outcome::Blurry { variance });
		}

		let scores = self.classifier.classify(normalize(&image), self.config.image_size as usize)?;
		debug!("Scores {scores:?}");

		Ok(Outcome::Label(self.label(&scores)?))
	}

	pub fn label(&self, scores: &[f32]) -> Result<Freshness, InferenceError> {
		if scores.is_empty() {
			return Err(InferenceError::EmptyScores);
		}
		if scores.iter().any(|score| !score.is_finite()) {
			return Err(InferenceError::NonFinite);
		}

		if self.config.label_rule == LabelRule::RoundFirst || scores.len() == 1 {
			return Ok(round_first(scores[0]));
		}

		if scores.len() != self.classes.len() {
			return Err(InferenceError::ClassCount { scores: scores.len(), classes: self.classes.len() });
		}

		let best = argmax(scores);
		let name = self.classes.name(best).ok_or(InferenceError::ClassCount {
			scores: scores.len(),
			classes: self.classes.len(),
		})?;

		Ok(Freshness::from_class_name(name))
	}
}

fn round_first(score: f32) -> Freshness {
	// ties go to even, 0.5 reads as fresh
	let index = score.clamp(0.0, 1.0).round_ties_even() as usize;
	FRESHNESS_LABELS[index]
}

/// Index of the first maximum.
fn argmax(scores: &[f32]) -> usize {
	let mut best = 0;
	for (index, score) in scores.iter().enumerate() {
		if *score > scores[best] {
			best = index;
		}
	}
	best
}

/// Splits off the data-URL header, decodes the base64 payload and resizes the image.
pub fn decode_image(data_url: &str, size: u32) -> Result<RgbImage, DecodeError> {
	let (_, payload) = data_url.split_once(',').ok_or(DecodeError::MissingPayload)?;
	let bytes = STANDARD.decode(payload.trim())?;
	let image = image::load_from_memory(&bytes)?;

	Ok(vision::resize(&image, size)?)
}

pub fn normalize(image: &RgbImage) -> Vec<f32> {
	image.as_raw().iter().map(|value| *value as f32 / 255.0).collect()
}

#[cfg(test)]
mod tests {
	use super::*;
	use burn::backend::NdArray;
	use image::{ImageFormat, Rgb};
	use std::io::Cursor;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct Fixed {
		scores: Vec<f32>,
		calls: AtomicUsize,
	}

	impl Fixed {
		fn new(scores: &[f32]) -> Self {
			Self { scores: scores.to_vec(), calls: AtomicUsize::new(0) }
		}
	}

	impl Classifier for Fixed {
		fn classify(&self, pixels: Vec<f32>, size: usize) -> Result<Vec<f32>, InferenceError> {
			assert_eq!(pixels.len(), size * size * 3);
			assert!(pixels.iter().all(|value| (0.0..=1.0).contains(value)));
			self.calls.fetch_add(1, Ordering::SeqCst);
			Ok(self.scores.clone())
		}
	}

	fn classes(names: &[&str]) -> ClassMap {
		ClassMap::new(names.iter().map(|name| name.to_string()).collect())
	}

	fn pipeline(scores: &[f32]) -> Pipeline<Fixed> {
		Pipeline::new(Fixed::new(scores), classes(&["fresh", "rotten"]), PipelineConfig::new())
	}

	fn data_url(image: &RgbImage) -> String {
		let mut bytes = Cursor::new(Vec::new());
		image.write_to(&mut bytes, ImageFormat::Png).unwrap();
		format!("data:image/png;base64,{}", STANDARD.encode(bytes.into_inner()))
	}

	fn checkerboard() -> RgbImage {
		RgbImage::from_fn(224, 224, |x, y| {
			if (x / 8 + y / 8) % 2 == 0 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
		})
	}

	#[test]
	fn sharp_image_is_classified() {
		let rotten = pipeline(&[0.8]);
		let fresh = pipeline(&[0.2]);

		assert_eq!(rotten.predict(&data_url(&checkerboard())).unwrap(), Outcome::Label(Freshness::Rotten));
		assert_eq!(fresh.predict(&data_url(&checkerboard())).unwrap(), Outcome::Label(Freshness::Fresh));
		assert_eq!(rotten.classifier.calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn flat_image_is_rejected_before_the_model_runs() {
		let pipeline = pipeline(&[0.9]);
		let flat = RgbImage::from_pixel(300, 200, Rgb([120, 180, 60]));

		let outcome = pipeline.predict(&data_url(&flat)).unwrap();

		assert_eq!(outcome, Outcome::Blurry { variance: 0.0 });
		assert_eq!(pipeline.classifier.calls.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn header_is_ignored() {
		let pipeline = pipeline(&[0.9]);
		let url = data_url(&checkerboard());
		let (_, payload) = url.split_once(',').unwrap();

		let outcome = pipeline.predict(&format!("anything,{payload}")).unwrap();

		assert_eq!(outcome, Outcome::Label(Freshness::Rotten));
	}

	#[test]
	fn undecodable_input_is_a_decode_error() {
		let pipeline = pipeline(&[0.9]);

		for input in ["no separator", "data:image/png;base64,!!!not base64!!!", "data:image/png;base64,aGVsbG8="] {
			assert!(
				matches!(pipeline.predict(input), Err(PredictError::Decode(_))),
				"{input:?} should fail to decode"
			);
		}
		assert_eq!(pipeline.classifier.calls.load(Ordering::SeqCst), 0);
	}

	#[test]
	fn single_score_rounds_half_to_even() {
		let pipeline = pipeline(&[]);

		assert_eq!(pipeline.label(&[0.5]).unwrap(), Freshness::Fresh);
		assert_eq!(pipeline.label(&[0.5001]).unwrap(), Freshness::Rotten);
		assert_eq!(pipeline.label(&[-3.0]).unwrap(), Freshness::Fresh);
		assert_eq!(pipeline.label(&[7.0]).unwrap(), Freshness::Rotten);
	}

	#[test]
	fn several_scores_pick_the_best_class() {
		let pipeline = Pipeline::new(
			Fixed::new(&[]),
			classes(&["freshapples", "freshbanana", "rottenapples", "RottenBanana"]),
			PipelineConfig::new(),
		);

		assert_eq!(pipeline.label(&[0.1, 0.6, 0.2, 0.1]).unwrap(), Freshness::Fresh);
		assert_eq!(pipeline.label(&[0.1, 0.1, 0.1, 0.7]).unwrap(), Freshness::Rotten);
		// first maximum wins
		assert_eq!(pipeline.label(&[0.4, 0.1, 0.4, 0.1]).unwrap(), Freshness::Fresh);
	}

	#[test]
	fn round_first_ignores_the_other_scores() {
		let pipeline = Pipeline::new(
			Fixed::new(&[]),
			classes(&["fresh", "rotten"]),
			PipelineConfig::new().with_label_rule(LabelRule::RoundFirst),
		);

		assert_eq!(pipeline.label(&[0.9, 0.1]).unwrap(), Freshness::Rotten);
	}

	#[test]
	fn unusable_scores_are_errors() {
		let pipeline = pipeline(&[]);

		assert!(matches!(pipeline.label(&[]), Err(InferenceError::EmptyScores)));
		assert!(matches!(pipeline.label(&[f32::NAN]), Err(InferenceError::NonFinite)));
		assert!(matches!(
			pipeline.label(&[0.2, 0.3, 0.5]),
			Err(InferenceError::ClassCount { scores: 3, classes: 2 })
		));
	}

	#[test]
	fn burn_classifier_returns_probabilities() {
		let device = Default::default();
		let model = crate::model::FreshnessModelConfig::new(3).init::<NdArray>(&device);
		let classifier = BurnClassifier::new(model, device);

		let scores = classifier.classify(vec![0.5; 32 * 32 * 3], 32).unwrap();

		assert_eq!(scores.len(), 3);
		assert!((scores.iter().sum::<f32>() - 1.0).abs() < 1e-4);
	}

	#[test]
	fn panic_while_holding_the_model_does_not_poison_later_requests() {
		let device = Default::default();
		let model = crate::model::FreshnessModelConfig::new(2).init::<NdArray>(&device);
		let classifier = std::sync::Arc::new(BurnClassifier::new(model, device));

		let holder = std::sync::Arc::clone(&classifier);
		let crashed = std::thread::spawn(move || {
			let _guard = holder.model.lock().unwrap();
			panic!("forward failed");
		})
		.join();
		assert!(crashed.is_err());
		assert!(classifier.model.is_poisoned());

		let scores = classifier.classify(vec![0.5; 16 * 16 * 3], 16).unwrap();

		assert_eq!(scores.len(), 2);
		assert!(!classifier.model.is_poisoned());
	}
}
