//! Orchestrator tying every collaborator together for one inbound request
//! (spec.md §2's data-flow diagram): C1 detect → C3 select candidates →
//! C7's attempt loop (which itself drives C10/C4/C5/codec/C6) → translate
//! the resulting [`retry::Outcome`] into a response the transport layer
//! ([`crate::server`]) can write back to the client.

use bytes::Bytes;
use http::HeaderMap;

use crate::cache::RequestCache;
use crate::context::RequestContext;
use crate::count_tokens;
use crate::detect;
use crate::endpoint::EndpointRegistry;
use crate::endpoint::selector;
use crate::executor::AttemptExecutor;
use crate::health::HealthSink;
use crate::retry::{self, Outcome};

/// Request tags are an operator-facing routing knob spec.md §9 leaves
/// unspecified ("Open Question: where do per-request tags come from on
/// the wire?"). This crate takes them from an optional, comma-separated
/// request header rather than inventing a body field every dialect would
/// need to carry — the header survives untouched across every codec
/// conversion, so Phase A selection (spec.md §4.2) never depends on a
/// dialect-specific parse. See DESIGN.md for the recorded decision.
pub const TAGS_HEADER: &str = "x-gateway-tags";

/// What [`handle_request`] hands back to the transport layer. Distinct
/// from [`retry::SuccessResponse`] because the two failure outcomes
/// (`CountTokensSynthesize`, `AllFailed`) also need a status/body/flag
/// triple, not just the success path.
pub struct DispatchResponse {
	pub status: u16,
	pub headers: HeaderMap,
	pub body: Bytes,
	pub skip_logging: bool,
}

impl DispatchResponse {
	fn json(status: u16, body: Bytes, skip_logging: bool) -> Self {
		let mut headers = HeaderMap::new();
		headers.insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("application/json"));
		DispatchResponse { status, headers, body, skip_logging }
	}
}

fn required_tags(headers: &HeaderMap) -> Vec<String> {
	headers
		.get(TAGS_HEADER)
		.and_then(|v| v.to_str().ok())
		.map(|v| {
			v.split(',')
				.map(str::trim)
				.filter(|t| !t.is_empty())
				.map(str::to_string)
				.collect()
		})
		.unwrap_or_default()
}

/// Entry point called by every [`crate::server`] route handler. `path` is
/// the path the client actually hit (used for both C1 detection and the
/// `count_tokens` path check); `query` is the raw query string.
pub async fn handle_request(
	registry: &EndpointRegistry,
	executor: &AttemptExecutor,
	health: &dyn HealthSink,
	path: &str,
	query: &str,
	headers: &HeaderMap,
	body: Bytes,
) -> DispatchResponse {
	let Some(detection) = detect::detect(path, query, headers) else {
		return unroutable_response();
	};

	let tags = required_tags(headers);
	let pools = selector::select_candidates(registry, detection.dialect, &tags);
	let is_count_tokens = count_tokens::is_count_tokens_path(path);

	let mut ctx = RequestContext::new(path, body, detection.dialect, detection.client_type);
	let mut cache = RequestCache::new();

	tracing::info!(
		request_id = %ctx.request_id,
		dialect = ?detection.dialect,
		client_type = ?detection.client_type,
		detected_by = detection.detected_by,
		tagged_candidates = pools.tagged.len(),
		universal_candidates = pools.universal.len(),
		is_count_tokens,
		"dispatching request"
	);

	if pools.is_empty() {
		return all_endpoints_failed_response(&ctx.request_id, &tags, 0, 0, 0, 0);
	}

	match retry::run(&pools, &mut ctx, &mut cache, executor, health, is_count_tokens).await {
		Outcome::Success(success) => DispatchResponse {
			status: success.status,
			headers: success.headers,
			body: success.body,
			skip_logging: ctx.skip_logging,
		},
		Outcome::CountTokensSynthesize => {
			let estimate = count_tokens::estimate_input_tokens(&ctx.original_body);
			let body = count_tokens::synthesize_body(estimate);
			tracing::info!(request_id = %ctx.request_id, estimate, "synthesizing local count_tokens response");
			DispatchResponse::json(200, body, true)
		},
		Outcome::AllFailed { tagged_active, tagged_total, universal_active, universal_total } => {
			all_endpoints_failed_response(&ctx.request_id, &tags, tagged_active, tagged_total, universal_active, universal_total)
		},
	}
}

/// No detection rule matched the inbound request at all (spec.md §4.1
/// rule 6, "otherwise unknown") — distinct from `all_endpoints_failed`,
/// which requires a dialect to have been established before candidate
/// selection could even run.
fn unroutable_response() -> DispatchResponse {
	let value = serde_json::json!({
		"error": {
			"type": "unrecognized_request",
			"message": "could not determine a wire dialect for this request",
		},
	});
	DispatchResponse::json(404, Bytes::from(serde_json::to_vec(&value).expect("static shape always serializes")), true)
}

/// Builds the exact body spec.md §6 specifies: `"request <id> with tag
/// (<t>) had failed on A active out of T (with tags) and A' active of T'
/// (universal) endpoints"`. `tags` joins with `,` when present; spec.md's
/// wording assumes a single tag context but doesn't forbid zero or many,
/// so an empty tag list renders as an empty `()`.
fn all_endpoints_failed_response(
	request_id: &str,
	tags: &[String],
	tagged_active: usize,
	tagged_total: usize,
	universal_active: usize,
	universal_total: usize,
) -> DispatchResponse {
	let tag_str = tags.join(",");
	let message = format!(
		"request {request_id} with tag ({tag_str}) had failed on {tagged_active} active out of {tagged_total} (with tags) and {universal_active} active of {universal_total} (universal) endpoints"
	);
	let value = serde_json::json!({
		"error": {
			"type": "all_endpoints_failed",
			"message": message,
			"request_id": request_id,
		},
	});
	DispatchResponse::json(502, Bytes::from(serde_json::to_vec(&value).expect("static shape always serializes")), false)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn required_tags_splits_and_trims_header() {
		let mut headers = HeaderMap::new();
		headers.insert(TAGS_HEADER, http::HeaderValue::from_static(" beta, internal ,gpu"));
		assert_eq!(required_tags(&headers), vec!["beta".to_string(), "internal".to_string(), "gpu".to_string()]);
	}

	#[test]
	fn required_tags_defaults_to_empty_without_header() {
		assert!(required_tags(&HeaderMap::new()).is_empty());
	}

	#[test]
	fn all_endpoints_failed_body_matches_spec_shape() {
		let resp = all_endpoints_failed_response("req-1", &["beta".to_string()], 0, 2, 1, 3);
		assert_eq!(resp.status, 502);
		let parsed: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
		assert_eq!(parsed["error"]["type"], "all_endpoints_failed");
		assert_eq!(parsed["error"]["request_id"], "req-1");
		let message = parsed["error"]["message"].as_str().unwrap();
		assert!(message.contains("req-1"));
		assert!(message.contains("with tag (beta)"));
		assert!(message.contains("0 active out of 2"));
		assert!(message.contains("1 active of 3"));
	}

	#[test]
	fn unroutable_response_is_404_and_skips_logging() {
		let resp = unroutable_response();
		assert_eq!(resp.status, 404);
		assert!(resp.skip_logging);
	}
}
