//! C9 — Learning Store policy. `endpoint::runtime` owns the latches
//! themselves (so they compose with the single per-endpoint lock); this
//! module decides, given a classified outcome, *which* latch to pull
//! (spec.md §4.8's five transition rules).

use crate::context::RequestContext;
use crate::endpoint::runtime::{DetectedAuthHeader, TriState};
use crate::endpoint::Endpoint;

/// Rule 1 + 2: a successful response on `auth_type: auto` latches whichever
/// header produced it; a successful response against the Responses path
/// latches `native_codex_format = yes` (or `no` the first time a
/// non-Responses call to the same endpoint succeeds).
pub fn observe_success(endpoint: &Endpoint, ctx: &RequestContext, used_header: Option<DetectedAuthHeader>) {
	if let Some(header) = used_header {
		endpoint.runtime.latch_detected_auth_header(header);
	}
	if ctx.endpoint_dialect == Some(crate::dialect::Dialect::OpenAiResponses) {
		endpoint.runtime.latch_native_codex_format(TriState::Yes);
	}
}

/// Rule 3: a hard 404/501-shaped rejection of the Responses path latches
/// `native_codex_format = no` so later requests skip straight to the
/// Chat Completions bridge for this endpoint.
pub fn observe_responses_unsupported(endpoint: &Endpoint) {
	endpoint.runtime.latch_native_codex_format(TriState::No);
}

/// Rule 4: parameter names harvested from a 400 body (see
/// `classify::extract_unsupported_params`) grow the endpoint's
/// learned-unsupported-params set monotonically; returns the parameter
/// names that were newly learned (for logging), restricted to names that
/// were actually present as top-level keys in the sent body (spec.md
/// §4.8: "only names actually present in the sent body are added").
pub fn observe_unsupported_params(endpoint: &Endpoint, harvested: &[String], sent_body: &serde_json::Value) -> Vec<String> {
	let present = harvested
		.iter()
		.filter(|name| sent_body.get(name.as_str()).is_some())
		.cloned();
	endpoint.runtime.add_unsupported_params(present)
}

/// Rule 5: a `count_tokens` call that 404s or otherwise fails against an
/// endpoint disables `count_tokens_enabled` for that endpoint going
/// forward, so the dispatcher routes future count_tokens calls straight to
/// the local synthetic estimator (spec.md §4.8, §4.9).
pub fn observe_count_tokens_unsupported(endpoint: &Endpoint) {
	endpoint.runtime.set_count_tokens_enabled(false);
}

#[cfg(test)]
mod tests {
	use bytes::Bytes;

	use super::*;
	use crate::dialect::{ClientType, Dialect};
	use crate::endpoint::{AuthType, EndpointConfig};

	fn endpoint() -> Endpoint {
		Endpoint::new(EndpointConfig {
			id: "e1".into(),
			name: "e1".into(),
			enabled: true,
			priority: 0,
			url_anthropic: None,
			url_openai: Some("https://api.openai.com".into()),
			url_gemini: None,
			endpoint_type: Dialect::OpenAiResponses,
			auth_type: AuthType::Auto,
			auth_value: "k".into(),
			oauth_refresh: None,
			tags: Default::default(),
			model_rewrite: vec![],
			parameter_overrides: Default::default(),
			header_overrides: Default::default(),
			error_pattern_rules: Default::default(),
		})
	}

	#[test]
	fn success_latches_auth_header_once() {
		let ep = endpoint();
		let ctx = RequestContext::new("/responses", Bytes::new(), Dialect::OpenAiResponses, ClientType::Codex);
		observe_success(&ep, &ctx, Some(DetectedAuthHeader::Authorization));
		observe_success(&ep, &ctx, Some(DetectedAuthHeader::ApiKey));
		assert_eq!(
			ep.runtime.learned_snapshot().detected_auth_header,
			Some(DetectedAuthHeader::Authorization)
		);
	}

	#[test]
	fn unsupported_params_accumulate_across_calls() {
		let ep = endpoint();
		let sent = serde_json::json!({"tool_choice": "auto", "model": "gpt-5"});
		let added = observe_unsupported_params(&ep, &["tool_choice".to_string()], &sent);
		assert_eq!(added, vec!["tool_choice".to_string()]);
		assert!(observe_unsupported_params(&ep, &["tool_choice".to_string()], &sent).is_empty());
		assert!(observe_unsupported_params(&ep, &["nonexistent".to_string()], &sent).is_empty());
	}

	#[test]
	fn only_params_present_in_sent_body_are_learned() {
		let ep = endpoint();
		let sent = serde_json::json!({"model": "gpt-5"});
		let added = observe_unsupported_params(&ep, &["tool_choice".to_string(), "model".to_string()], &sent);
		assert_eq!(added, vec!["model".to_string()]);
	}
}
