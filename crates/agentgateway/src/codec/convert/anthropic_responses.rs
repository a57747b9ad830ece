//! Anthropic Messages ⇄ OpenAI Responses translation, composed from the
//! two Chat Completions bridges rather than duplicated: Chat Completions
//! is the hub dialect both of the teacher's conversion modules
//! (`messages.rs`, `responses.rs`) are built around, so a direct
//! Anthropic<->Responses path reuses that shared intermediate
//! representation instead of hand-rolling a third translation.

use serde_json::{Map, Value, json};

use crate::codec::convert::anthropic_chat::{anthropic_request_to_chat, anthropic_response_to_chat};
use crate::codec::convert::responses_chat::{chat_response_to_responses, responses_request_to_chat};
use crate::codec::types::anthropic::{AnthropicRequest, AnthropicResponse};
use crate::codec::types::openai_responses::{ResponsesRequest, ResponsesResponse};
use crate::error::CodecError;

pub fn anthropic_request_to_responses(req: &AnthropicRequest) -> Result<ResponsesRequest, CodecError> {
	let chat = anthropic_request_to_chat(req)?;
	let input = chat
		.messages
		.iter()
		.map(|m| {
			serde_json::json!({
				"role": m.role,
				"content": m.content.clone().unwrap_or(serde_json::Value::Null),
			})
		})
		.collect();
	Ok(ResponsesRequest {
		model: chat.model,
		input: serde_json::Value::Array(input),
		instructions: None,
		max_output_tokens: chat.max_tokens,
		tools: chat.tools,
		tool_choice: chat.tool_choice,
		stream: chat.stream,
		rest: chat.rest,
	})
}

pub fn responses_request_to_anthropic(req: &ResponsesRequest, max_tokens: u32) -> Result<AnthropicRequest, CodecError> {
	use crate::codec::types::anthropic::{AnthropicContent, AnthropicMessage};

	let chat = responses_request_to_chat(req)?;
	let mut system = None;
	let mut messages = Vec::new();
	for m in chat.messages {
		if m.role == "system" {
			system = m.content;
			continue;
		}
		let text = m
			.content
			.and_then(|c| c.as_str().map(|s| s.to_string()))
			.unwrap_or_default();
		messages.push(AnthropicMessage {
			role: m.role,
			content: AnthropicContent::Text(text),
		});
	}

	Ok(AnthropicRequest {
		model: chat.model,
		max_tokens,
		messages,
		system,
		tools: chat.tools,
		tool_choice: chat.tool_choice,
		temperature: chat.temperature,
		stream: chat.stream,
		rest: chat.rest,
	})
}

/// Response direction: a Responses-native upstream answering a request
/// that arrived as Anthropic. Used only when `native_codex_format = yes`
/// is latched for the endpoint (spec.md §4.8) — otherwise the dispatcher
/// goes through the Chat Completions bridge instead.
pub fn responses_response_to_anthropic(resp: &ResponsesResponse) -> Result<AnthropicResponse, CodecError> {
	let mut content = Vec::new();
	for item in &resp.output {
		if item.get("type").and_then(|t| t.as_str()) != Some("message") {
			continue;
		}
		if let Some(parts) = item.get("content").and_then(|c| c.as_array()) {
			for part in parts {
				if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
					content.push(json!({ "type": "text", "text": text }));
				}
			}
		}
	}

	let usage = resp.usage.as_ref().map(|u| {
		json!({
			"input_tokens": u.get("input_tokens").cloned().unwrap_or(json!(0)),
			"output_tokens": u.get("output_tokens").cloned().unwrap_or(json!(0)),
		})
	});

	Ok(AnthropicResponse {
		id: resp.id.clone(),
		response_type: "message".to_string(),
		role: "assistant".to_string(),
		model: resp.model.clone(),
		content,
		stop_reason: Some("end_turn".to_string()),
		usage,
		rest: Map::new(),
	})
}

/// Response direction: an Anthropic-native upstream answering a request
/// that arrived as Codex/Responses.
pub fn anthropic_response_to_responses(resp: &AnthropicResponse) -> Result<ResponsesResponse, CodecError> {
	let chat = anthropic_response_to_chat(resp)?;
	chat_response_to_responses(&chat)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn translates_responses_output_text_into_anthropic_content_block() {
		let resp = ResponsesResponse {
			id: "resp_1".into(),
			model: "gpt-5-codex".into(),
			output: vec![json!({
				"type": "message",
				"role": "assistant",
				"content": [{ "type": "output_text", "text": "hi there" }],
			})],
			usage: Some(json!({"input_tokens": 10, "output_tokens": 4})),
			rest: Map::new(),
		};
		let anth = responses_response_to_anthropic(&resp).unwrap();
		assert_eq!(anth.content.len(), 1);
		assert_eq!(anth.content[0]["text"], "hi there");
	}
}
