//! Local token-count estimator used for the `count_tokens` synthetic
//! response (spec.md §8 scenario 6): "every endpoint short-circuits with
//! `count_tokens_openai_skip=true`; after exhausting the list the core
//! returns `{"input_tokens": <estimate>, "proxy_estimated": true, "detail":
//! "count_tokens handled locally ..."}` with HTTP 200 and
//! `skip_logging=true`."
//!
//! Same `tiktoken_rs` singleton-lookup-by-model and `tokens_per_message`
//! accounting approach used elsewhere for chat completion token counts,
//! adapted to this crate's typed
//! [`crate::codec::types::count_tokens::CountTokensRequest`] instead of a
//! generic chat-message list.

use bytes::Bytes;
use serde_json::Value;
use tiktoken_rs::CoreBPE;
use tiktoken_rs::tokenizer::{Tokenizer, get_tokenizer};

use crate::codec::types::anthropic::AnthropicContent;
use crate::codec::types::count_tokens::CountTokensRequest;

pub fn is_count_tokens_path(path: &str) -> bool {
	path.ends_with("/count_tokens")
}

/// The BPE tables take ~200ms to build on first use, so the app's startup
/// warms them outside the request path rather than paying that cost on
/// the first live request.
pub fn preload_tokenizers() {
	let _ = tiktoken_rs::cl100k_base_singleton();
	let _ = tiktoken_rs::o200k_base_singleton();
}

fn bpe_for_model(model: &str) -> &'static CoreBPE {
	let tokenizer = get_tokenizer(model).unwrap_or(Tokenizer::Cl100kBase);
	get_bpe_from_tokenizer(tokenizer)
}

fn get_bpe_from_tokenizer(tokenizer: Tokenizer) -> &'static CoreBPE {
	match tokenizer {
		Tokenizer::O200kHarmony => tiktoken_rs::o200k_harmony_singleton(),
		Tokenizer::O200kBase => tiktoken_rs::o200k_base_singleton(),
		Tokenizer::Cl100kBase => tiktoken_rs::cl100k_base_singleton(),
		Tokenizer::R50kBase => tiktoken_rs::r50k_base_singleton(),
		Tokenizer::P50kBase => tiktoken_rs::r50k_base_singleton(),
		Tokenizer::P50kEdit => tiktoken_rs::r50k_base_singleton(),
		Tokenizer::Gpt2 => tiktoken_rs::r50k_base_singleton(),
	}
}

/// Best-effort estimate of `input_tokens` for an Anthropic-shaped request
/// body (the only dialect `/v1/messages/count_tokens` is ever called
/// against). A body that doesn't parse still yields a number — `0` — rather
/// than failing the synthesis; the caller only reaches this path once every
/// real endpoint has already failed, so refusing to answer at all would be
/// strictly worse than an honest zero.
pub fn estimate_input_tokens(body: &[u8]) -> u64 {
	let Ok(req) = serde_json::from_slice::<CountTokensRequest>(body) else {
		return 0;
	};
	let bpe = bpe_for_model(&req.model);

	const TOKENS_PER_MESSAGE: u64 = 3;
	let mut total: u64 = 0;

	if let Some(system) = &req.system {
		total += count_value_text(bpe, system);
	}

	for message in &req.messages {
		total += TOKENS_PER_MESSAGE;
		total += 1; // role
		match &message.content {
			AnthropicContent::Text(text) => {
				total += bpe.encode_with_special_tokens(text).len() as u64;
			},
			AnthropicContent::Blocks(blocks) => {
				for block in blocks {
					total += count_block_text(bpe, block);
				}
			},
		}
	}
	total += 3; // every reply is primed with <|start|>assistant<|message|>
	total
}

fn count_block_text(bpe: &CoreBPE, block: &Value) -> u64 {
	match block.get("type").and_then(|t| t.as_str()) {
		Some("text") => block
			.get("text")
			.and_then(|t| t.as_str())
			.map(|t| bpe.encode_with_special_tokens(t).len() as u64)
			.unwrap_or(0),
		_ => 0,
	}
}

fn count_value_text(bpe: &CoreBPE, value: &Value) -> u64 {
	match value {
		Value::String(s) => bpe.encode_with_special_tokens(s).len() as u64,
		Value::Array(items) => items.iter().map(|v| count_block_text(bpe, v)).sum(),
		_ => 0,
	}
}

/// Builds the exact synthetic response body spec.md §8 scenario 6 names.
pub fn synthesize_body(input_tokens: u64) -> Bytes {
	let value = serde_json::json!({
		"input_tokens": input_tokens,
		"proxy_estimated": true,
		"detail": "count_tokens handled locally because every candidate endpoint could not serve it",
	});
	Bytes::from(serde_json::to_vec(&value).expect("static shape always serializes"))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn recognizes_count_tokens_path() {
		assert!(is_count_tokens_path("/v1/messages/count_tokens"));
		assert!(!is_count_tokens_path("/v1/messages"));
	}

	#[test]
	fn estimates_nonzero_tokens_for_text_message() {
		let body = br#"{"model":"claude-3-opus","max_tokens":256,"messages":[{"role":"user","content":"hello there, how are you today?"}]}"#;
		let estimate = estimate_input_tokens(body);
		assert!(estimate > 0);
	}

	#[test]
	fn estimates_zero_for_unparseable_body() {
		assert_eq!(estimate_input_tokens(b"not json"), 0);
	}

	#[test]
	fn synthesized_body_matches_scenario_6_shape() {
		let body = synthesize_body(42);
		let parsed: Value = serde_json::from_slice(&body).unwrap();
		assert_eq!(parsed["input_tokens"], 42);
		assert_eq!(parsed["proxy_estimated"], true);
		assert!(parsed["detail"].as_str().unwrap().contains("count_tokens"));
	}

	#[test]
	fn block_content_sums_text_blocks_only() {
		let body = br#"{"model":"claude-3-opus","max_tokens":256,"messages":[{"role":"user","content":[{"type":"text","text":"hi"},{"type":"tool_use","id":"x","name":"y","input":{}}]}]}"#;
		let estimate = estimate_input_tokens(body);
		assert!(estimate > 0);
	}
}
