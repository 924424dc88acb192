//! Fixed set of inference threads behind a bounded queue.

use freshness::error::{InferenceError, PredictError};
use freshness::infer::{Classifier, Outcome, Pipeline};
use log::{error, warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

struct Job {
	image: String,
	deadline: Instant,
	reply: mpsc::Sender<Result<Outcome, PredictError>>,
}

pub struct InferencePool {
	jobs: SyncSender<Job>,
}

impl InferencePool {
	/// Starts `threads` inference threads. At most `queue` requests wait behind them,
	/// anything beyond that is turned away with [`InferenceError::Busy`].
	pub fn new<C: Classifier + 'static>(pipeline: Pipeline<C>, threads: usize, queue: usize) -> Self {
		let (jobs, receiver) = mpsc::sync_channel::<Job>(queue);
		let receiver = Arc::new(Mutex::new(receiver));
		let pipeline = Arc::new(pipeline);

		for _ in 0..threads.max(1) {
			let receiver = Arc::clone(&receiver);
			let pipeline = Arc::clone(&pipeline);
			thread::spawn(move || work(&receiver, &pipeline));
		}

		Self { jobs }
	}

	/// Queues the prediction and waits up to `timeout` for its answer.
	///
	/// A job still queued when its caller gives up is skipped by the threads.
	pub fn predict(&self, image: String, timeout: Duration) -> Result<Outcome, PredictError> {
		let (reply, answer) = mpsc::channel();
		let job = Job { image, deadline: Instant::now() + timeout, reply };

		match self.jobs.try_send(job) {
			Ok(()) => {}
			Err(TrySendError::Full(_)) => return Err(InferenceError::Busy.into()),
			Err(TrySendError::Disconnected(_)) => return Err(InferenceError::Disconnected.into()),
		}

		match answer.recv_timeout(timeout) {
			Ok(result) => result,
			Err(RecvTimeoutError::Timeout) => Err(InferenceError::Timeout(timeout).into()),
			Err(RecvTimeoutError::Disconnected) => Err(InferenceError::Disconnected.into()),
		}
	}
}

fn work<C: Classifier>(jobs: &Mutex<Receiver<Job>>, pipeline: &Pipeline<C>) {
	loop {
		let job = {
			let receiver = jobs.lock().unwrap_or_else(PoisonError::into_inner);
			receiver.recv()
		};
		let Ok(job) = job else { break };

		if Instant::now() >= job.deadline {
			warn!("Skipping a prediction nobody is waiting for anymore");
			continue;
		}

		let result = panic::catch_unwind(AssertUnwindSafe(|| pipeline.predict(&job.image))).unwrap_or_else(|_| {
			error!("Prediction panicked");
			Err(InferenceError::Panicked.into())
		});
		let _ = job.reply.send(result);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::handlers::tests::{checkerboard, png_data_url, Stub};
	use freshness::artifact::ClassMap;
	use freshness::infer::PipelineConfig;
	use std::sync::atomic::{AtomicUsize, Ordering};

	struct Counting {
		delay: Duration,
		calls: Arc<AtomicUsize>,
	}

	impl Classifier for Counting {
		fn classify(&self, _pixels: Vec<f32>, _size: usize) -> Result<Vec<f32>, InferenceError> {
			self.calls.fetch_add(1, Ordering::SeqCst);
			thread::sleep(self.delay);
			Ok(vec![0.2])
		}
	}

	fn pipeline<C: Classifier>(classifier: C) -> Pipeline<C> {
		let classes = ClassMap::new(vec!["fresh".to_string(), "rotten".to_string()]);
		Pipeline::new(classifier, classes, PipelineConfig::new())
	}

	fn counting_pool(delay: Duration, threads: usize, queue: usize) -> (Arc<InferencePool>, Arc<AtomicUsize>) {
		let calls = Arc::new(AtomicUsize::new(0));
		let pool = InferencePool::new(pipeline(Counting { delay, calls: Arc::clone(&calls) }), threads, queue);
		(Arc::new(pool), calls)
	}

	#[test]
	fn full_queue_turns_requests_away() {
		let (pool, calls) = counting_pool(Duration::from_millis(500), 1, 1);
		let image = png_data_url(&checkerboard());

		let spawn_request = |pool: &Arc<InferencePool>| {
			let pool = Arc::clone(pool);
			let image = image.clone();
			thread::spawn(move || pool.predict(image, Duration::from_secs(5)))
		};
		// one running, one queued
		let running = spawn_request(&pool);
		thread::sleep(Duration::from_millis(100));
		let queued = spawn_request(&pool);
		thread::sleep(Duration::from_millis(100));

		let started = Instant::now();
		let rejected = pool.predict(image.clone(), Duration::from_secs(5));

		assert!(matches!(rejected, Err(PredictError::Inference(InferenceError::Busy))));
		assert!(started.elapsed() < Duration::from_millis(400));
		assert!(running.join().unwrap().is_ok());
		assert!(queued.join().unwrap().is_ok());
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[test]
	fn abandoned_jobs_are_skipped() {
		let (pool, calls) = counting_pool(Duration::from_millis(300), 1, 4);
		let image = png_data_url(&checkerboard());

		let running = {
			let pool = Arc::clone(&pool);
			let image = image.clone();
			thread::spawn(move || pool.predict(image, Duration::from_secs(5)))
		};
		thread::sleep(Duration::from_millis(50));

		let abandoned = pool.predict(image, Duration::from_millis(100));
		assert!(matches!(abandoned, Err(PredictError::Inference(InferenceError::Timeout(_)))));

		assert!(running.join().unwrap().is_ok());
		thread::sleep(Duration::from_millis(200));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn panicking_prediction_keeps_the_thread_alive() {
		let pool = InferencePool::new(pipeline(Stub::Panic), 1, 1);
		let image = png_data_url(&checkerboard());

		for _ in 0..2 {
			let result = pool.predict(image.clone(), Duration::from_secs(5));

			assert!(matches!(result, Err(PredictError::Inference(InferenceError::Panicked))));
		}
	}

	#[test]
	fn blurry_images_never_reach_the_model() {
		let (pool, calls) = counting_pool(Duration::ZERO, 2, 2);
		let flat = png_data_url(&image::RgbImage::from_pixel(64, 64, image::Rgb([120, 90, 40])));

		let result = pool.predict(flat, Duration::from_secs(5));

		assert!(matches!(result, Ok(Outcome::Blurry { .. })));
		assert_eq!(calls.load(Ordering::SeqCst), 0);
	}
}
