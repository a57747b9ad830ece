//! OpenAI Responses ⇄ Chat Completions translation. Grounded on the
//! teacher's `llm/conversion/responses.rs`, which handles the Responses
//! side of the wire but (per SPEC_FULL.md) only as an SSE passthrough; this
//! module adds the structural request/response translation the dispatch
//! engine needs when an endpoint speaks only Chat Completions but the
//! inbound client is Codex-family (native Responses).

use serde_json::{Map, Value, json};

use crate::codec::types::openai_chat::{ChatCompletionsRequest, ChatCompletionsResponse, ChatMessage};
use crate::codec::types::openai_responses::{ResponsesRequest, ResponsesResponse};
use crate::error::CodecError;

pub fn responses_request_to_chat(req: &ResponsesRequest) -> Result<ChatCompletionsRequest, CodecError> {
	let mut messages = Vec::new();

	if let Some(instructions) = &req.instructions {
		messages.push(ChatMessage {
			role: "system".to_string(),
			content: Some(Value::String(instructions.clone())),
			tool_calls: None,
			tool_call_id: None,
			name: None,
		});
	}

	match &req.input {
		Value::String(text) => messages.push(ChatMessage {
			role: "user".to_string(),
			content: Some(Value::String(text.clone())),
			tool_calls: None,
			tool_call_id: None,
			name: None,
		}),
		Value::Array(items) => {
			for item in items {
				let role = item
					.get("role")
					.and_then(|r| r.as_str())
					.unwrap_or("user")
					.to_string();
				let content = item.get("content").cloned().unwrap_or(Value::Null);
				messages.push(ChatMessage {
					role,
					content: Some(flatten_input_content(&content)),
					tool_calls: None,
					tool_call_id: None,
					name: None,
				});
			}
		},
		_ => {
			return Err(CodecError::UnsupportedConversion {
				from: "openai_responses",
				to: "openai_chat",
			});
		},
	}

	Ok(ChatCompletionsRequest {
		model: req.model.clone(),
		messages,
		max_tokens: req.max_output_tokens,
		max_completion_tokens: None,
		tools: req.tools.clone(),
		tool_choice: req.tool_choice.clone(),
		temperature: None,
		stream: req.stream,
		rest: req.rest.clone(),
	})
}

fn flatten_input_content(content: &Value) -> Value {
	match content {
		Value::Array(parts) => {
			let joined = parts
				.iter()
				.filter_map(|p| p.get("text").and_then(|t| t.as_str()))
				.collect::<Vec<_>>()
				.join("\n");
			Value::String(joined)
		},
		other => other.clone(),
	}
}

pub fn chat_response_to_responses(resp: &ChatCompletionsResponse) -> Result<ResponsesResponse, CodecError> {
	let choice = resp
		.choices
		.first()
		.ok_or_else(|| CodecError::Transient("upstream response had no choices".to_string()))?;
	let message = choice.get("message").cloned().unwrap_or(Value::Null);
	let text = message.get("content").and_then(|c| c.as_str()).unwrap_or_default();

	let output = vec![json!({
		"type": "message",
		"role": "assistant",
		"content": [{ "type": "output_text", "text": text }],
	})];

	let usage = resp.usage.as_ref().map(|u| {
		json!({
			"input_tokens": u.get("prompt_tokens").cloned().unwrap_or(json!(0)),
			"output_tokens": u.get("completion_tokens").cloned().unwrap_or(json!(0)),
		})
	});

	Ok(ResponsesResponse {
		id: resp.id.clone(),
		model: resp.model.clone(),
		output,
		usage,
		rest: Map::new(),
	})
}

/// Request direction: Chat Completions -> Responses, used when a Chat
/// client is dispatched to a Responses-only endpoint. The leading
/// `system` message becomes `instructions`; the rest becomes the
/// Responses `input` item list.
pub fn chat_request_to_responses(req: &ChatCompletionsRequest) -> Result<ResponsesRequest, CodecError> {
	let mut instructions = None;
	let mut items = Vec::new();

	for m in &req.messages {
		if m.role == "system" {
			instructions = m.content.as_ref().and_then(|c| c.as_str()).map(|s| s.to_string());
			continue;
		}
		items.push(json!({
			"role": m.role,
			"content": m.content.clone().unwrap_or(Value::Null),
		}));
	}

	Ok(ResponsesRequest {
		model: req.model.clone(),
		input: Value::Array(items),
		instructions,
		max_output_tokens: req.max_tokens.or(req.max_completion_tokens),
		tools: req.tools.clone(),
		tool_choice: req.tool_choice.clone(),
		stream: req.stream,
		rest: req.rest.clone(),
	})
}

/// Response direction: Responses -> Chat Completions, used when the
/// request arrived as Chat but had to be dispatched to a Responses-native
/// endpoint.
pub fn responses_response_to_chat(resp: &ResponsesResponse) -> Result<ChatCompletionsResponse, CodecError> {
	let mut text_parts = Vec::new();
	for item in &resp.output {
		if item.get("type").and_then(|t| t.as_str()) != Some("message") {
			continue;
		}
		if let Some(parts) = item.get("content").and_then(|c| c.as_array()) {
			for part in parts {
				if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
					text_parts.push(text.to_string());
				}
			}
		}
	}

	let usage = resp.usage.as_ref().map(|u| {
		json!({
			"prompt_tokens": u.get("input_tokens").cloned().unwrap_or(json!(0)),
			"completion_tokens": u.get("output_tokens").cloned().unwrap_or(json!(0)),
		})
	});

	Ok(ChatCompletionsResponse {
		id: resp.id.clone(),
		model: resp.model.clone(),
		choices: vec![json!({
			"index": 0,
			"message": { "role": "assistant", "content": text_parts.join("\n") },
			"finish_reason": "stop",
		})],
		usage,
		rest: Map::new(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn translates_string_input_to_single_user_message() {
		let req = ResponsesRequest {
			model: "gpt-5-codex".into(),
			input: Value::String("hello".into()),
			instructions: Some("be terse".into()),
			max_output_tokens: Some(100),
			tools: None,
			tool_choice: None,
			stream: false,
			rest: Map::new(),
		};
		let chat = responses_request_to_chat(&req).unwrap();
		assert_eq!(chat.messages.len(), 2);
		assert_eq!(chat.messages[0].role, "system");
		assert_eq!(chat.messages[1].role, "user");
	}

	#[test]
	fn chat_system_message_becomes_responses_instructions() {
		let req = ChatCompletionsRequest {
			model: "gpt-5-codex".into(),
			messages: vec![
				ChatMessage {
					role: "system".into(),
					content: Some(Value::String("be terse".into())),
					tool_calls: None,
					tool_call_id: None,
					name: None,
				},
				ChatMessage {
					role: "user".into(),
					content: Some(Value::String("hi".into())),
					tool_calls: None,
					tool_call_id: None,
					name: None,
				},
			],
			max_tokens: Some(64),
			max_completion_tokens: None,
			tools: None,
			tool_choice: None,
			temperature: None,
			stream: false,
			rest: Map::new(),
		};
		let resp = chat_request_to_responses(&req).unwrap();
		assert_eq!(resp.instructions, Some("be terse".to_string()));
		let items = resp.input.as_array().unwrap();
		assert_eq!(items.len(), 1);
	}

	#[test]
	fn responses_output_text_becomes_chat_choice() {
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
		let chat = responses_response_to_chat(&resp).unwrap();
		assert_eq!(chat.choices[0]["message"]["content"], "hi there");
	}
}
