use crate::pool::InferencePool;
use std::sync::Arc;
use std::time::Duration;

/// Everything a worker needs to answer a request.
#[derive(Clone)]
pub struct ServerState {
	pub pool: Arc<InferencePool>,
	pub predict_timeout: Duration,
}

impl ServerState {
	pub fn new(pool: InferencePool, predict_timeout: Duration) -> Self {
		Self { pool: Arc::new(pool), predict_timeout }
	}
}
