use crate::handlers;
use crate::state::ServerState;
use log::{debug, error};
use serde::Serialize;
use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

const INDEX_HTML: &str = include_str!("../static/index.html");
const SCRIPT_JS: &str = include_str!("../static/script.js");

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn with_content_type(response: Response<Cursor<Vec<u8>>>, content_type: &str) -> Response<Cursor<Vec<u8>>> {
	match Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
		Ok(header) => response.with_header(header),
		Err(()) => response,
	}
}

pub fn json_response<T: Serialize>(value: &T) -> Response<Cursor<Vec<u8>>> {
	match serde_json::to_vec(value) {
		Ok(body) => with_content_type(Response::from_data(body), "application/json"),
		Err(err) => {
			error!("Could not serialize response: {err}");
			Response::from_data(Vec::new()).with_status_code(StatusCode(500))
		}
	}
}

pub fn html_response(body: &str) -> Response<Cursor<Vec<u8>>> {
	with_content_type(Response::from_data(body.as_bytes().to_vec()), "text/html; charset=utf-8")
}

pub fn script_response(body: &str) -> Response<Cursor<Vec<u8>>> {
	with_content_type(Response::from_data(body.as_bytes().to_vec()), "application/javascript")
}

pub fn not_found() -> Response<Cursor<Vec<u8>>> {
	with_content_type(Response::from_data(b"404 Not Found".to_vec()), "text/plain").with_status_code(StatusCode(404))
}

pub fn method_not_allowed(allow: &str) -> Response<Cursor<Vec<u8>>> {
	let response = with_content_type(Response::from_data(b"405 Method Not Allowed".to_vec()), "text/plain")
		.with_status_code(StatusCode(405));
	match Header::from_bytes(&b"Allow"[..], allow.as_bytes()) {
		Ok(header) => response.with_header(header),
		Err(()) => response,
	}
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

pub fn dispatch(mut request: Request, state: &ServerState) {
	let method = request.method().clone();
	let path = request.url().split('?').next().unwrap_or_default().to_owned();
	debug!("{method} {path}");

	let response = match (method, path.as_str()) {
		(Method::Post, "/predict") => handlers::handle_predict(&mut request, state),
		(_, "/predict") => method_not_allowed("POST"),
		(Method::Get, "/") => html_response(INDEX_HTML),
		(Method::Get, "/static/script.js") => script_response(SCRIPT_JS),
		_ => not_found(),
	};

	if let Err(err) = request.respond(response) {
		error!("Could not send response: {err}");
	}
}

/// Answers requests on `workers` threads until the listener shuts down.
pub fn serve(server: Arc<Server>, state: ServerState, workers: usize) {
	let handles: Vec<_> = (0..workers.max(1))
		.map(|_| {
			let server = Arc::clone(&server);
			let state = state.clone();

			thread::spawn(move || {
				for request in server.incoming_requests() {
					dispatch(request, &state);
				}
			})
		})
		.collect();

	for handle in handles {
		if handle.join().is_err() {
			error!("Worker thread panicked");
		}
	}
}
