//! C5 — Attempt Executor. Issues one outbound HTTP call for a prepared
//! request and captures the response for the classifier and the client
//! response writer (spec.md §4.4).
//!
//! Grounded on `reqwest` directly rather than the teacher's own
//! `client::Client` (that type wraps a hyper-level mesh/HBONE transport for
//! the teacher's sidecar-proxy use case, which has nothing to do with
//! calling an LLM provider's HTTP API); `reqwest` is already part of the
//! teacher's dependency stack and is the crate the pack's other examples
//! reach for when making plain outbound HTTP calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::HeaderMap;
use http::header::CONTENT_TYPE;
use parking_lot::Mutex;

use crate::pipeline::PreparedRequest;

/// Response capture is bounded at 64 KiB for validation/logging (spec.md
/// §5); the full body is always forwarded to the client regardless of this
/// cap.
pub const CAPTURE_CAP_BYTES: usize = 64 * 1024;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// One completed attempt's raw result, before classification.
pub struct AttemptResult {
	pub status: u16,
	pub headers: HeaderMap,
	pub body: Bytes,
	/// First `CAPTURE_CAP_BYTES` of `body`, used for response-shape
	/// validation and logging without holding the whole streamed body.
	pub captured_snippet: Bytes,
	pub first_byte_ms: u128,
	pub is_event_stream: bool,
}

impl AttemptResult {
	pub fn snippet_str(&self) -> Option<&str> {
		std::str::from_utf8(&self.captured_snippet).ok()
	}
}

/// Caches one `reqwest::Client` per distinct base URL (SPEC_FULL.md: "one
/// `reqwest::Client` per distinct (proxy, timeout) configuration, cached
/// and reused"). `EndpointConfig`'s data model (spec.md §3) carries no
/// per-endpoint proxy/TLS/timeout fields, so every client shares
/// `DEFAULT_TIMEOUT`; the cache key is the upstream host, which is the only
/// axis that actually varies today.
pub struct AttemptExecutor {
	clients: Mutex<HashMap<String, Arc<reqwest::Client>>>,
}

impl AttemptExecutor {
	pub fn new() -> Self {
		AttemptExecutor {
			clients: Mutex::new(HashMap::new()),
		}
	}

	fn client_for(&self, base_url: &str) -> Arc<reqwest::Client> {
		let host_key = host_key(base_url);
		if let Some(client) = self.clients.lock().get(&host_key) {
			return client.clone();
		}
		let client = Arc::new(
			reqwest::Client::builder()
				.timeout(DEFAULT_TIMEOUT)
				.build()
				.unwrap_or_default(),
		);
		self.clients.lock().insert(host_key, client.clone());
		client
	}

	/// Issues `prepared` against `base_url`, returning the raw response
	/// capture. Network-level failures (DNS, connect, TLS, timeout) are
	/// surfaced as `Err(reqwest::Error)`; the caller (C7) is responsible for
	/// turning that into an `AttemptOutcome::transport_error`.
	pub async fn execute(&self, base_url: &str, prepared: &PreparedRequest) -> Result<AttemptResult, reqwest::Error> {
		let client = self.client_for(base_url);
		let url = format!("{}{}", base_url.trim_end_matches('/'), prepared.path);

		let started = Instant::now();
		let response = client
			.post(&url)
			.headers(prepared.headers.clone())
			.body(prepared.body.clone())
			.send()
			.await?;
		let first_byte_ms = started.elapsed().as_millis();

		let status = response.status().as_u16();
		let headers = response.headers().clone();
		let is_event_stream = headers
			.get(CONTENT_TYPE)
			.and_then(|v| v.to_str().ok())
			.is_some_and(|v| v.starts_with("text/event-stream"));

		let body = response.bytes().await?;
		let captured_snippet = body.slice(0..body.len().min(CAPTURE_CAP_BYTES));

		Ok(AttemptResult {
			status,
			headers,
			body,
			captured_snippet,
			first_byte_ms,
			is_event_stream,
		})
	}
}

impl Default for AttemptExecutor {
	fn default() -> Self {
		Self::new()
	}
}

fn host_key(base_url: &str) -> String {
	http::Uri::try_from(base_url)
		.ok()
		.and_then(|u| u.authority().map(|a| a.to_string()))
		.unwrap_or_else(|| base_url.to_string())
}

/// Hop-by-hop headers stripped before forwarding a response to the client
/// when conversion altered the body (spec.md §4.4: "`Content-Length` and
/// `Content-Encoding` are stripped and recomputed").
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
	headers.remove(http::header::CONTENT_LENGTH);
	headers.remove(http::header::CONTENT_ENCODING);
	headers.remove(http::header::TRANSFER_ENCODING);
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn host_key_extracts_authority() {
		assert_eq!(host_key("https://api.openai.com/v1"), "api.openai.com");
		assert_eq!(host_key("not a url"), "not a url");
	}

	#[test]
	fn strip_hop_by_hop_removes_length_and_encoding() {
		let mut headers = HeaderMap::new();
		headers.insert(http::header::CONTENT_LENGTH, "10".parse().unwrap());
		headers.insert(http::header::CONTENT_ENCODING, "gzip".parse().unwrap());
		strip_hop_by_hop(&mut headers);
		assert!(headers.get(http::header::CONTENT_LENGTH).is_none());
		assert!(headers.get(http::header::CONTENT_ENCODING).is_none());
	}
}
