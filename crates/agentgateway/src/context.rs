//! Request context threaded through the pipeline, executor, classifier,
//! and retry controller for a single inbound request (spec.md §3).

use std::time::Instant;

use bytes::Bytes;
use uuid::Uuid;

use crate::dialect::{ClientType, Dialect};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStage {
	RequestBody,
	ResponseBody,
	Sse,
}

/// Everything that is fixed for the lifetime of the inbound request, plus
/// the mutable per-attempt slots the retry controller rewrites in place
/// between attempts (spec.md §4.6's "rewrite and replay" hot path).
pub struct RequestContext {
	pub request_id: String,
	pub start_time: Instant,
	pub inbound_path: String,
	pub original_body: Bytes,
	pub detected_dialect: Dialect,
	pub detected_client_type: ClientType,

	// Per-attempt slots, rewritten in place between retries.
	pub effective_path: String,
	pub final_body: Bytes,
	pub endpoint_dialect: Option<Dialect>,
	pub needs_conversion: bool,
	pub conversion_stages: Vec<ConversionStage>,
	pub original_model: Option<String>,
	pub rewritten_model: Option<String>,
	pub attempt_number: u32,
	pub last_error: Option<String>,
	pub last_status_code: Option<u16>,
	pub first_byte_time: Option<Instant>,

	// Flags.
	pub skip_health_record: bool,
	pub skip_logging: bool,
	pub count_tokens_openai_skip: bool,
	pub auth_method_tried: bool,
	pub auth_retry_attempted: bool,
	pub oauth_refresh_attempted: bool,
}

impl RequestContext {
	pub fn new(inbound_path: impl Into<String>, original_body: Bytes, dialect: Dialect, client_type: ClientType) -> Self {
		let inbound_path = inbound_path.into();
		RequestContext {
			request_id: Uuid::new_v4().to_string(),
			start_time: Instant::now(),
			effective_path: inbound_path.clone(),
			inbound_path,
			final_body: original_body.clone(),
			original_body,
			detected_dialect: dialect,
			detected_client_type: client_type,
			endpoint_dialect: None,
			needs_conversion: false,
			conversion_stages: Vec::new(),
			original_model: None,
			rewritten_model: None,
			attempt_number: 0,
			last_error: None,
			last_status_code: None,
			first_byte_time: None,
			skip_health_record: false,
			skip_logging: false,
			count_tokens_openai_skip: false,
			auth_method_tried: false,
			auth_retry_attempted: false,
			oauth_refresh_attempted: false,
		}
	}

	/// Records the dialect/body/path a successful pipeline run prepared for
	/// the attempt in flight, keeping the request-scoped fields and the
	/// flags that must persist across attempts (auth/oauth retry guards, per
	/// spec.md §4.6). `attempt_number` itself is owned by the retry
	/// controller's loop, which also has to count blacklist short-circuits
	/// and hot-path replays that never reach this point.
	pub fn begin_attempt(&mut self, endpoint_dialect: Dialect, body: Bytes, path: String) {
		self.endpoint_dialect = Some(endpoint_dialect);
		self.final_body = body;
		self.effective_path = path;
		self.conversion_stages.clear();
		self.last_error = None;
		self.last_status_code = None;
		self.first_byte_time = None;
	}

	pub fn elapsed_ms(&self) -> u128 {
		self.start_time.elapsed().as_millis()
	}
}
