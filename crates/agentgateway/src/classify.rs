//! C6 — Error Classifier. Maps a raw attempt outcome (status code +
//! response body snapshot + transport/validation signals) onto the closed
//! `ErrorKind` set the retry controller (C7) switches on (spec.md §4.5).
//!
//! `ConfigError` is not produced here: it is assigned directly by the
//! retry controller whenever a [`crate::error::GatewayError`] surfaces
//! mid-attempt (pipeline build / auth assembly failure), per spec.md §7
//! ("local errors never leak directly to the client").

use crate::error::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
	/// 4xx with no server-internal marker and no recognized business-error
	/// shape — a client-shaped rejection retrying the same endpoint won't
	/// fix.
	ClientError,
	/// 5xx, or a body containing a server-internal marker string
	/// regardless of the reported status (spec.md §4.5: "server-internal
	/// markers must win over business-error detection even when a 4xx is
	/// returned").
	ServerError,
	/// Transport-level failure: no HTTP status was ever received.
	NetworkError,
	/// A 2xx response whose body fails a semantic usage-stats check.
	UsageValidation,
	/// A streamed response missing its terminal marker (`[DONE]` /
	/// `message_stop` / a `finish_reason`).
	SSEValidation,
	/// A non-streamed 2xx response that fails a response-shape check other
	/// than the usage-stats one.
	OtherValidation,
	/// The attempt received headers/status but failed to read the body.
	ResponseTimeout,
	/// A JSON body carrying a top-level `error` field that is not a
	/// server-internal marker in disguise.
	BusinessError,
	/// Local pipeline/config/auth-assembly failure; never produced by
	/// `classify`, only constructed by the retry controller directly.
	ConfigError,
}

/// Conversion failures are reported alongside an `ErrorKind` rather than
/// folded into it, since a codec failure can occur on either a request or
/// response leg and carries no HTTP status of its own.
#[derive(Debug, Clone)]
pub struct Classified {
	pub kind: ErrorKind,
	pub codec_error: Option<CodecError>,
}

/// Everything the classifier needs to know about one completed attempt.
/// Populated by the executor (C5): `status`/`body_snippet` from the
/// buffered response, `transport_error` when the HTTP call itself never
/// produced a response, and the three validation flags from the
/// post-response checks the executor runs before handing control back to
/// the retry controller.
pub struct AttemptOutcome<'a> {
	pub status: Option<u16>,
	pub body_snippet: Option<&'a str>,
	pub transport_error: bool,
	pub body_read_failed: bool,
	pub usage_validation_failed: bool,
	pub sse_validation_failed: bool,
	pub other_validation_failed: bool,
}

impl<'a> AttemptOutcome<'a> {
	pub fn transport_error(message: &'a str) -> Self {
		AttemptOutcome {
			status: None,
			body_snippet: Some(message),
			transport_error: true,
			body_read_failed: false,
			usage_validation_failed: false,
			sse_validation_failed: false,
			other_validation_failed: false,
		}
	}

	pub fn success(status: u16) -> Self {
		AttemptOutcome {
			status: Some(status),
			body_snippet: None,
			transport_error: false,
			body_read_failed: false,
			usage_validation_failed: false,
			sse_validation_failed: false,
			other_validation_failed: false,
		}
	}
}

const SERVER_INTERNAL_MARKERS: &[&str] = &["null pointer", "internal server error", "is null", "cannot invoke"];
const NETWORK_ERROR_MARKERS: &[&str] = &["connection", "timeout", "dial tcp", "no such host"];

fn contains_marker(haystack: Option<&str>, markers: &[&str]) -> bool {
	let Some(haystack) = haystack else { return false };
	let lower = haystack.to_ascii_lowercase();
	markers.iter().any(|m| lower.contains(m))
}

/// Ordered exactly as spec.md §4.5's table and prose precedence:
/// 1. transport failure / network-shaped message -> `NetworkError`
/// 2. server-internal marker in the body, regardless of status -> `ServerError`
/// 3. 5xx -> `ServerError`
/// 4. failed to read the body -> `ResponseTimeout`
/// 5. the three post-response validation flags, in the order spec.md §8
///    scenario ordering implies (usage, then SSE, then generic shape)
/// 6. 4xx: a recognized `{"error": ...}` business shape -> `BusinessError`,
///    otherwise -> `ClientError`
/// 7. anything left over (unexpected 2xx/3xx with no validation failure
///    reported, or an unmapped status) -> `ClientError` as the safest
///    "don't retry the same endpoint forever" default.
pub fn classify(outcome: &AttemptOutcome) -> Classified {
	let kind = classify_kind(outcome);
	Classified { kind, codec_error: None }
}

pub fn classify_codec_error(error: CodecError) -> Classified {
	let kind = if error.is_transient() {
		ErrorKind::ServerError
	} else {
		ErrorKind::ConfigError
	};
	Classified {
		kind,
		codec_error: Some(error),
	}
}

fn classify_kind(outcome: &AttemptOutcome) -> ErrorKind {
	if outcome.transport_error || contains_marker(outcome.body_snippet, NETWORK_ERROR_MARKERS) {
		return ErrorKind::NetworkError;
	}
	if contains_marker(outcome.body_snippet, SERVER_INTERNAL_MARKERS) {
		return ErrorKind::ServerError;
	}
	if let Some(status) = outcome.status {
		if (500..600).contains(&status) {
			return ErrorKind::ServerError;
		}
	}
	if outcome.body_read_failed {
		return ErrorKind::ResponseTimeout;
	}
	if outcome.usage_validation_failed {
		return ErrorKind::UsageValidation;
	}
	if outcome.sse_validation_failed {
		return ErrorKind::SSEValidation;
	}
	if outcome.other_validation_failed {
		return ErrorKind::OtherValidation;
	}
	match outcome.status {
		Some(status) if (400..500).contains(&status) => {
			if is_business_error_shape(outcome.body_snippet) {
				ErrorKind::BusinessError
			} else {
				ErrorKind::ClientError
			}
		},
		_ => ErrorKind::ClientError,
	}
}

/// "JSON body has top-level `error` field" (spec.md §4.5). Server-internal
/// markers are checked before this is ever reached, so a 4xx wrapping an
/// NPE never lands here.
fn is_business_error_shape(body: Option<&str>) -> bool {
	let Some(body) = body else { return false };
	let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
		return false;
	};
	value.get("error").is_some_and(|e| !e.is_null())
}

/// Best-effort scrape of an upstream 400 body for parameter names it
/// rejects, feeding the Learning Store's unsupported-parameter latch
/// (spec.md §4.8 rule 4: "keywords `tool|function|function_call|
/// tool_choice` contribute a fixed parameter set, and a regex harvests a
/// field name"). Kept independent of `ErrorKind`: the harvest runs
/// whenever the status is 400, regardless of whether the body also
/// happened to classify as `BusinessError` or plain `ClientError`.
pub fn extract_unsupported_params(status: Option<u16>, body: Option<&str>) -> Vec<String> {
	if status != Some(400) {
		return Vec::new();
	}
	let Some(body) = body else { return Vec::new() };
	let mut found = std::collections::BTreeSet::new();

	if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
		for key in ["param", "unknown_field", "unrecognized_field"] {
			if let Some(name) = value
				.get("error")
				.and_then(|e| e.get(key))
				.or_else(|| value.get(key))
				.and_then(|v| v.as_str())
			{
				found.insert(name.to_string());
			}
		}
	}

	let lower = body.to_ascii_lowercase();
	if ["tool", "function", "function_call", "tool_choice"]
		.iter()
		.any(|kw| lower.contains(kw))
	{
		for name in ["tools", "tool_choice", "functions", "function_call"] {
			found.insert(name.to_string());
		}
	}

	if let Some(name) = harvest_quoted_parameter_name(&lower) {
		found.insert(name);
	}

	found.into_iter().collect()
}

/// Matches the spec's informal `parameter[ '":]*<name>` pattern: the word
/// "parameter" followed by punctuation/whitespace and a bare identifier.
fn harvest_quoted_parameter_name(lower_body: &str) -> Option<String> {
	let idx = lower_body.find("parameter")?;
	let rest = &lower_body[idx + "parameter".len()..];
	let name: String = rest
		.trim_start_matches(|c: char| c == ' ' || c == '\'' || c == '"' || c == ':')
		.chars()
		.take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
		.collect();
	if name.is_empty() { None } else { Some(name) }
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	fn outcome(status: Option<u16>, body: Option<&str>) -> AttemptOutcome<'_> {
		AttemptOutcome {
			status,
			body_snippet: body,
			transport_error: false,
			body_read_failed: false,
			usage_validation_failed: false,
			sse_validation_failed: false,
			other_validation_failed: false,
		}
	}

	#[rstest]
	#[case(500, ErrorKind::ServerError)]
	#[case(503, ErrorKind::ServerError)]
	#[case(404, ErrorKind::ClientError)]
	#[case(422, ErrorKind::ClientError)]
	fn classifies_status_only(#[case] status: u16, #[case] expected: ErrorKind) {
		let out = outcome(Some(status), None);
		assert_eq!(classify(&out).kind, expected);
	}

	#[test]
	fn transport_error_is_network_error() {
		let out = AttemptOutcome::transport_error("dial tcp: no such host");
		assert_eq!(classify(&out).kind, ErrorKind::NetworkError);
	}

	#[test]
	fn business_error_shape_on_400() {
		let out = outcome(Some(400), Some(r#"{"error":{"message":"bad request"}}"#));
		assert_eq!(classify(&out).kind, ErrorKind::BusinessError);
	}

	#[test]
	fn plain_400_without_error_field_is_client_error() {
		let out = outcome(Some(400), Some("bad request"));
		assert_eq!(classify(&out).kind, ErrorKind::ClientError);
	}

	#[test]
	fn five_hundred_with_business_shaped_body_is_still_server_error() {
		let out = outcome(Some(500), Some(r#"{"error":{"param":"tool_choice"}}"#));
		assert_eq!(classify(&out).kind, ErrorKind::ServerError);
	}

	#[test]
	fn four_xx_wrapping_null_pointer_is_server_error_not_business_error() {
		// spec.md §4.5: "some upstreams wrap NPEs in 4xx" — the marker must
		// win even though the status and body otherwise look like a 4xx
		// business error.
		let out = outcome(Some(400), Some(r#"{"error":{"message":"java.lang.NullPointerException: foo is null"}}"#));
		assert_eq!(classify(&out).kind, ErrorKind::ServerError);
	}

	#[test]
	fn validation_flags_take_priority_over_bare_2xx_status() {
		let mut out = outcome(Some(200), None);
		out.sse_validation_failed = true;
		assert_eq!(classify(&out).kind, ErrorKind::SSEValidation);
	}

	#[test]
	fn body_read_failure_is_response_timeout() {
		let mut out = outcome(Some(200), None);
		out.body_read_failed = true;
		assert_eq!(classify(&out).kind, ErrorKind::ResponseTimeout);
	}

	#[test]
	fn extracts_unsupported_parameter_name_from_openai_shape() {
		let params = extract_unsupported_params(Some(400), Some(r#"{"error":{"param":"tool_choice"}}"#));
		assert!(params.contains(&"tool_choice".to_string()));
	}

	#[test]
	fn extracts_nothing_when_status_is_not_400() {
		assert!(extract_unsupported_params(Some(404), Some(r#"{"error":{"param":"x"}}"#)).is_empty());
	}

	#[test]
	fn tool_keyword_contributes_fixed_parameter_set() {
		let params = extract_unsupported_params(Some(400), Some("the 'tools' field is not supported by this model"));
		assert!(params.contains(&"tools".to_string()));
		assert!(params.contains(&"tool_choice".to_string()));
	}

	#[test]
	fn codec_transient_error_maps_to_server_error() {
		let classified = classify_codec_error(CodecError::Transient("boom".into()));
		assert_eq!(classified.kind, ErrorKind::ServerError);
	}

	#[test]
	fn codec_hard_error_maps_to_config_error() {
		let classified = classify_codec_error(CodecError::UnsupportedConversion {
			from: "gemini",
			to: "anthropic",
		});
		assert_eq!(classified.kind, ErrorKind::ConfigError);
	}
}
