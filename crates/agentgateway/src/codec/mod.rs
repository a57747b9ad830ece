//! The codec collaborator (spec.md §6): "`Convert(operation, endpointName,
//! body) -> body`... must be deterministic and pure". `spec.md` §1 treats
//! this as an external collaborator specified only by its interface; this
//! module ships one concrete implementation so the dispatch engine is
//! exercisable end to end (SPEC_FULL.md "Codec collaborator").
//!
//! Every conversion round-trips through the typed wire shapes in
//! [`types`] rather than raw `serde_json::Value` munging, following the
//! teacher's `llm::conversion` modules; [`convert`] holds the per-pair
//! translation functions and this module only wires dialect pairs to the
//! right one.

pub mod convert;
pub mod providers;
pub mod sse;
pub mod types;

use bytes::Bytes;
use serde_json::Value;

use crate::dialect::Dialect;
use crate::error::CodecError;
use types::anthropic::{AnthropicRequest, AnthropicResponse};
use types::openai_chat::{ChatCompletionsRequest, ChatCompletionsResponse};
use types::openai_responses::{ResponsesRequest, ResponsesResponse};

fn parse<T: serde::de::DeserializeOwned>(dialect: &'static str, body: &[u8]) -> Result<T, CodecError> {
	serde_json::from_slice(body).map_err(|e| CodecError::Malformed { dialect, source: e })
}

fn serialize<T: serde::Serialize>(dialect: &'static str, value: &T) -> Result<Bytes, CodecError> {
	serde_json::to_vec(value)
		.map(Bytes::from)
		.map_err(|e| CodecError::Malformed { dialect, source: e })
}

/// A request arrived speaking `from` and must be translated so the chosen
/// upstream (speaking `to`) can understand it. `max_tokens_fallback` is
/// used only for Chat/Responses -> Anthropic conversions, where
/// Anthropic's `max_tokens` is mandatory but the source dialect's
/// equivalent field is optional.
pub fn convert_request(from: Dialect, to: Dialect, body: &[u8], max_tokens_fallback: u32) -> Result<Bytes, CodecError> {
	if from == to {
		return Ok(Bytes::copy_from_slice(body));
	}
	use Dialect::*;
	match (from, to) {
		(Anthropic, OpenAiChat) => {
			let req: AnthropicRequest = parse("anthropic", body)?;
			let out = convert::anthropic_chat::anthropic_request_to_chat(&req)?;
			serialize("openai_chat", &out)
		},
		(OpenAiChat, Anthropic) => {
			let req: ChatCompletionsRequest = parse("openai_chat", body)?;
			let out = convert::anthropic_chat::chat_request_to_anthropic(&req, max_tokens_fallback)?;
			serialize("anthropic", &out)
		},
		(OpenAiResponses, OpenAiChat) => {
			let req: ResponsesRequest = parse("openai_responses", body)?;
			let out = convert::responses_chat::responses_request_to_chat(&req)?;
			serialize("openai_chat", &out)
		},
		(OpenAiChat, OpenAiResponses) => {
			let req: ChatCompletionsRequest = parse("openai_chat", body)?;
			let out = convert::responses_chat::chat_request_to_responses(&req)?;
			serialize("openai_responses", &out)
		},
		(Anthropic, OpenAiResponses) => {
			let req: AnthropicRequest = parse("anthropic", body)?;
			let out = convert::anthropic_responses::anthropic_request_to_responses(&req)?;
			serialize("openai_responses", &out)
		},
		(OpenAiResponses, Anthropic) => {
			let req: ResponsesRequest = parse("openai_responses", body)?;
			let out = convert::anthropic_responses::responses_request_to_anthropic(&req, max_tokens_fallback)?;
			serialize("anthropic", &out)
		},
		_ => Err(CodecError::UnsupportedConversion {
			from: from.as_str(),
			to: to.as_str(),
		}),
	}
}

/// A response arrived from an upstream speaking `from` and must be
/// translated back into the dialect the client originally spoke (`to`).
pub fn convert_response(from: Dialect, to: Dialect, body: &[u8]) -> Result<Bytes, CodecError> {
	if from == to {
		return Ok(Bytes::copy_from_slice(body));
	}
	use Dialect::*;
	match (from, to) {
		(OpenAiChat, Anthropic) => {
			let resp: ChatCompletionsResponse = parse("openai_chat", body)?;
			let out = convert::anthropic_chat::chat_response_to_anthropic(&resp)?;
			serialize("anthropic", &out)
		},
		(Anthropic, OpenAiChat) => {
			let resp: AnthropicResponse = parse("anthropic", body)?;
			let out = convert::anthropic_chat::anthropic_response_to_chat(&resp)?;
			serialize("openai_chat", &out)
		},
		(OpenAiChat, OpenAiResponses) => {
			let resp: ChatCompletionsResponse = parse("openai_chat", body)?;
			let out = convert::responses_chat::chat_response_to_responses(&resp)?;
			serialize("openai_responses", &out)
		},
		(OpenAiResponses, OpenAiChat) => {
			let resp: ResponsesResponse = parse("openai_responses", body)?;
			let out = convert::responses_chat::responses_response_to_chat(&resp)?;
			serialize("openai_chat", &out)
		},
		(OpenAiResponses, Anthropic) => {
			let resp: ResponsesResponse = parse("openai_responses", body)?;
			let out = convert::anthropic_responses::responses_response_to_anthropic(&resp)?;
			serialize("anthropic", &out)
		},
		(Anthropic, OpenAiResponses) => {
			let resp: AnthropicResponse = parse("anthropic", body)?;
			let out = convert::anthropic_responses::anthropic_response_to_responses(&resp)?;
			serialize("openai_responses", &out)
		},
		_ => Err(CodecError::UnsupportedConversion {
			from: from.as_str(),
			to: to.as_str(),
		}),
	}
}

/// Pulls the `model` field out of a request body without fully parsing
/// the dialect-specific shape (spec.md §4.3 step 2 runs before the
/// pipeline knows which typed struct applies). Every dialect this crate
/// speaks puts `model` at the top level.
pub fn peek_model(body: &[u8]) -> Option<String> {
	let value: Value = serde_json::from_slice(body).ok()?;
	value.get("model")?.as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn same_dialect_is_passthrough() {
		let body = b"{\"model\":\"claude-3-opus\"}";
		let out = convert_request(Dialect::Anthropic, Dialect::Anthropic, body, 1024).unwrap();
		assert_eq!(&out[..], body);
	}

	#[test]
	fn anthropic_request_converts_to_chat_and_back() {
		let body = br#"{"model":"claude-3-opus","max_tokens":256,"messages":[{"role":"user","content":"hi"}]}"#;
		let chat_body = convert_request(Dialect::Anthropic, Dialect::OpenAiChat, body, 256).unwrap();
		let parsed: Value = serde_json::from_slice(&chat_body).unwrap();
		assert_eq!(parsed["messages"][0]["role"], "user");
	}

	#[test]
	fn peek_model_reads_top_level_field() {
		let body = b"{\"model\":\"gpt-5\",\"messages\":[]}";
		assert_eq!(peek_model(body), Some("gpt-5".to_string()));
	}

	#[test]
	fn gemini_conversion_is_unsupported() {
		let body = b"{}";
		let err = convert_request(Dialect::Anthropic, Dialect::Gemini, body, 1024).unwrap_err();
		assert!(matches!(err, CodecError::UnsupportedConversion { .. }));
	}
}
