//! C1 — Format Detector. Pure, side-effect-free classification of an
//! inbound request from its path and headers (spec.md §4.1). Body is never
//! inspected here; the rules are ordered exactly as spec.md lists them.

use http::HeaderMap;

use crate::dialect::{ClientType, Dialect};

/// Advisory confidence in the detection. Never gates behavior, only
/// informs logging, matching spec.md's "confidence is advisory."
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
	High,
	Low,
}

#[derive(Debug, Clone, Copy)]
pub struct Detection {
	pub dialect: Dialect,
	pub client_type: ClientType,
	pub confidence: Confidence,
	pub detected_by: &'static str,
}

/// Applies spec.md §4.1's ordered rules to an inbound path, query string,
/// and header map.
pub fn detect(path: &str, query: &str, headers: &HeaderMap) -> Option<Detection> {
	// Rule 1: path /v1/messages -> Anthropic.
	if path == "/v1/messages" || path.starts_with("/v1/messages/") {
		return Some(Detection {
			dialect: Dialect::Anthropic,
			client_type: ClientType::ClaudeCode,
			confidence: Confidence::High,
			detected_by: "path:/v1/messages",
		});
	}

	// Rule 2: path /responses -> OpenAI-Responses, client = Codex.
	if path == "/responses" || path.ends_with("/responses") {
		return Some(Detection {
			dialect: Dialect::OpenAiResponses,
			client_type: ClientType::Codex,
			confidence: Confidence::High,
			detected_by: "path:/responses",
		});
	}

	// Rule 3: path /chat/completions -> OpenAI-Chat; client inferred from UA.
	if path == "/chat/completions" || path.ends_with("/chat/completions") {
		let client_type = infer_client_from_user_agent(headers);
		return Some(Detection {
			dialect: Dialect::OpenAiChat,
			client_type,
			confidence: Confidence::High,
			detected_by: "path:/chat/completions",
		});
	}

	// Rule 4: path prefix /v1beta/ or query key `key` -> Gemini.
	if path.starts_with("/v1beta/") || has_query_key(query, "key") {
		return Some(Detection {
			dialect: Dialect::Gemini,
			client_type: ClientType::Generic,
			confidence: Confidence::High,
			detected_by: "path:/v1beta or query:key",
		});
	}

	// Rule 5: x-api-key present, no Authorization -> Anthropic client.
	let has_api_key = headers.contains_key("x-api-key");
	let has_auth = headers.contains_key(http::header::AUTHORIZATION);
	if has_api_key && !has_auth {
		return Some(Detection {
			dialect: Dialect::Anthropic,
			client_type: ClientType::ClaudeCode,
			confidence: Confidence::Low,
			detected_by: "header:x-api-key",
		});
	}

	None
}

fn infer_client_from_user_agent(headers: &HeaderMap) -> ClientType {
	let Some(ua) = headers
		.get(http::header::USER_AGENT)
		.and_then(|v| v.to_str().ok())
	else {
		return ClientType::Unknown;
	};
	let ua = ua.to_ascii_lowercase();
	if ua.contains("codex") {
		ClientType::Codex
	} else if ua.contains("claude") {
		ClientType::ClaudeCode
	} else {
		ClientType::Generic
	}
}

fn has_query_key(query: &str, key: &str) -> bool {
	query
		.split('&')
		.filter_map(|pair| pair.split_once('='))
		.any(|(k, _)| k == key)
}

#[cfg(test)]
mod tests {
	use http::HeaderMap;
	use http::header::{AUTHORIZATION, HeaderValue};

	use super::*;

	#[test]
	fn detects_anthropic_messages_path() {
		let d = detect("/v1/messages", "", &HeaderMap::new()).unwrap();
		assert_eq!(d.dialect, Dialect::Anthropic);
		assert_eq!(d.client_type, ClientType::ClaudeCode);
	}

	#[test]
	fn detects_codex_responses_path() {
		let d = detect("/responses", "", &HeaderMap::new()).unwrap();
		assert_eq!(d.dialect, Dialect::OpenAiResponses);
		assert_eq!(d.client_type, ClientType::Codex);
	}

	#[test]
	fn detects_chat_completions_path() {
		let d = detect("/v1/chat/completions", "", &HeaderMap::new()).unwrap();
		assert_eq!(d.dialect, Dialect::OpenAiChat);
	}

	#[test]
	fn detects_gemini_by_query_key() {
		let d = detect("/v1beta/models/gemini-pro:generateContent", "key=abc", &HeaderMap::new())
			.unwrap();
		assert_eq!(d.dialect, Dialect::Gemini);
	}

	#[test]
	fn path_rules_win_over_header_rules() {
		let mut headers = HeaderMap::new();
		headers.insert("x-api-key", HeaderValue::from_static("sk-test"));
		let d = detect("/v1/chat/completions", "", &headers).unwrap();
		assert_eq!(d.dialect, Dialect::OpenAiChat);
	}

	#[test]
	fn detects_anthropic_client_from_api_key_header() {
		let mut headers = HeaderMap::new();
		headers.insert("x-api-key", HeaderValue::from_static("sk-test"));
		let d = detect("/some/unknown/path", "", &headers).unwrap();
		assert_eq!(d.dialect, Dialect::Anthropic);
		assert_eq!(d.confidence, Confidence::Low);
	}

	#[test]
	fn api_key_rule_does_not_fire_with_authorization_present() {
		let mut headers = HeaderMap::new();
		headers.insert("x-api-key", HeaderValue::from_static("sk-test"));
		headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
		assert!(detect("/some/unknown/path", "", &headers).is_none());
	}

	#[test]
	fn unknown_when_nothing_matches() {
		assert!(detect("/healthz", "", &HeaderMap::new()).is_none());
	}
}
