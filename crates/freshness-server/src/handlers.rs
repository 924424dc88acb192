use crate::routes::json_response;
use crate::state::ServerState;
use freshness::infer::Outcome;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::io::{Cursor, Read};
use tiny_http::{Request, Response};

pub const BLURRY_MESSAGE: &str = "Blurry Image — Please recapture";
pub const ERROR_MESSAGE: &str = "Error in prediction";

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
	pub image: String,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
	pub result: String,
}

// POST /predict
pub fn handle_predict(request: &mut Request, state: &ServerState) -> Response<Cursor<Vec<u8>>> {
	let mut body = String::new();
	let result = match request.as_reader().read_to_string(&mut body) {
		Ok(_) => predict_body(&body, state),
		Err(err) => {
			error!("Could not read the request body: {err}");
			ERROR_MESSAGE.to_string()
		}
	};

	json_response(&PredictionResponse { result })
}

/// Maps a raw JSON body to the message sent back to the client.
pub fn predict_body(body: &str, state: &ServerState) -> String {
	let request: PredictRequest = match serde_json::from_str(body) {
		Ok(request) => request,
		Err(err) => {
			warn!("Rejected predict body: {err}");
			return ERROR_MESSAGE.to_string();
		}
	};
	debug!("Predict request with {} bytes of image data", request.image.len());

	match state.pool.predict(request.image, state.predict_timeout) {
		Ok(Outcome::Label(label)) => {
			info!("Predicted {label}");
			label.to_string()
		}
		Ok(Outcome::Blurry { variance }) => {
			warn!("Blurry image, Laplacian variance {variance:.2}");
			BLURRY_MESSAGE.to_string()
		}
		Err(err) => {
			error!("Prediction failed: {err}");
			ERROR_MESSAGE.to_string()
		}
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use crate::pool::InferencePool;
	use base64::engine::general_purpose::STANDARD;
	use base64::Engine;
	use freshness::artifact::ClassMap;
	use freshness::error::InferenceError;
	use freshness::infer::{Classifier, Pipeline, PipelineConfig};
	use image::{ImageFormat, Rgb, RgbImage};
	use std::thread;
	use std::time::Duration;

	pub(crate) enum Stub {
		Score(f32),
		Panic,
		Slow(Duration),
	}

	impl Classifier for Stub {
		fn classify(&self, _pixels: Vec<f32>, _size: usize) -> Result<Vec<f32>, InferenceError> {
			match self {
				Self::Score(score) => Ok(vec![*score]),
				Self::Panic => panic!("model blew up"),
				Self::Slow(delay) => {
					thread::sleep(*delay);
					Ok(vec![0.0])
				}
			}
		}
	}

	pub(crate) fn state(stub: Stub, timeout: Duration) -> ServerState {
		let classes = ClassMap::new(vec!["fresh".to_string(), "rotten".to_string()]);
		let pool = InferencePool::new(Pipeline::new(stub, classes, PipelineConfig::new()), 1, 4);
		ServerState::new(pool, timeout)
	}

	pub(crate) fn png_data_url(image: &RgbImage) -> String {
		let mut bytes = Cursor::new(Vec::new());
		image.write_to(&mut bytes, ImageFormat::Png).unwrap();
		format!("data:image/png;base64,{}", STANDARD.encode(bytes.into_inner()))
	}

	pub(crate) fn checkerboard() -> RgbImage {
		RgbImage::from_fn(224, 224, |x, y| {
			if (x / 4 + y / 4) % 2 == 0 { Rgb([250, 250, 250]) } else { Rgb([5, 5, 5]) }
		})
	}

	fn body(image: &str) -> String {
		serde_json::json!({ "image": image }).to_string()
	}

	#[test]
	fn sharp_image_gets_a_label() {
		let state = state(Stub::Score(0.9), Duration::from_secs(5));

		assert_eq!(predict_body(&body(&png_data_url(&checkerboard())), &state), "Rotten");
	}

	#[test]
	fn flat_image_gets_the_blur_advisory() {
		let state = state(Stub::Panic, Duration::from_secs(5));
		let pixel = RgbImage::from_pixel(1, 1, Rgb([200, 30, 30]));

		assert_eq!(predict_body(&body(&png_data_url(&pixel)), &state), BLURRY_MESSAGE);
	}

	#[test]
	fn bad_bodies_get_the_error_message() {
		let state = state(Stub::Score(0.1), Duration::from_secs(5));

		for body in ["", "not json", "{}", r#"{"picture": "x"}"#, r#"{"image": "data:image/png;base64,@@@"}"#, r#"{"image": 3}"#] {
			assert_eq!(predict_body(body, &state), ERROR_MESSAGE, "{body:?}");
		}
	}

	#[test]
	fn panicking_model_is_reported_not_propagated() {
		let state = state(Stub::Panic, Duration::from_secs(5));

		assert_eq!(predict_body(&body(&png_data_url(&checkerboard())), &state), ERROR_MESSAGE);
	}

	#[test]
	fn slow_model_times_out() {
		let state = state(Stub::Slow(Duration::from_secs(2)), Duration::from_millis(50));
		let started = std::time::Instant::now();

		assert_eq!(predict_body(&body(&png_data_url(&checkerboard())), &state), ERROR_MESSAGE);
		assert!(started.elapsed() < Duration::from_secs(1));
	}
}
