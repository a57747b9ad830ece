//! Anthropic Messages ⇄ OpenAI Chat Completions translation. Grounded on
//! the teacher's `llm/conversion/messages.rs` `from_completions::translate`
//! (system-prompt flattening, role mapping, tool/tool_choice translation),
//! generalized to also translate in the opposite direction since the
//! dispatch engine needs both (a Claude-Code client hitting an
//! OpenAI-only endpoint, and a Codex/Chat client hitting an
//! Anthropic-only endpoint).

use serde_json::{Map, Value, json};

use crate::codec::types::anthropic::{AnthropicContent, AnthropicMessage, AnthropicRequest, AnthropicResponse};
use crate::codec::types::openai_chat::{ChatCompletionsRequest, ChatCompletionsResponse, ChatMessage};
use crate::error::CodecError;

/// Request direction: Anthropic -> Chat Completions.
pub fn anthropic_request_to_chat(req: &AnthropicRequest) -> Result<ChatCompletionsRequest, CodecError> {
	let mut messages = Vec::with_capacity(req.messages.len() + 1);

	if let Some(system) = &req.system {
		messages.push(ChatMessage {
			role: "system".to_string(),
			content: Some(flatten_system(system)),
			tool_calls: None,
			tool_call_id: None,
			name: None,
		});
	}

	for m in &req.messages {
		messages.extend(translate_anthropic_message_to_chat(m)?);
	}

	Ok(ChatCompletionsRequest {
		model: req.model.clone(),
		messages,
		max_tokens: Some(req.max_tokens),
		max_completion_tokens: None,
		tools: req.tools.clone().map(|tools| tools.iter().map(anthropic_tool_to_openai).collect()),
		tool_choice: req.tool_choice.clone().map(|tc| anthropic_tool_choice_to_openai(&tc)),
		temperature: req.temperature,
		stream: req.stream,
		rest: req.rest.clone(),
	})
}

/// A system prompt may be a bare string or a list of typed text blocks;
/// Chat Completions only accepts a string.
fn flatten_system(system: &Value) -> Value {
	match system {
		Value::String(_) => system.clone(),
		Value::Array(blocks) => {
			let joined = blocks
				.iter()
				.filter_map(|b| b.get("text").and_then(|t| t.as_str()))
				.collect::<Vec<_>>()
				.join("\n");
			Value::String(joined)
		},
		other => other.clone(),
	}
}

fn translate_anthropic_message_to_chat(m: &AnthropicMessage) -> Result<Vec<ChatMessage>, CodecError> {
	match &m.content {
		AnthropicContent::Text(text) => Ok(vec![ChatMessage {
			role: m.role.clone(),
			content: Some(Value::String(text.clone())),
			tool_calls: None,
			tool_call_id: None,
			name: None,
		}]),
		AnthropicContent::Blocks(blocks) => {
			let mut out = Vec::new();
			let mut text_parts = Vec::new();
			let mut tool_calls = Vec::new();

			for block in blocks {
				match block.get("type").and_then(|t| t.as_str()) {
					Some("text") => {
						if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
							text_parts.push(t.to_string());
						}
					},
					Some("tool_use") => {
						tool_calls.push(json!({
							"id": block.get("id").cloned().unwrap_or(Value::Null),
							"type": "function",
							"function": {
								"name": block.get("name").cloned().unwrap_or(Value::Null),
								"arguments": serde_json::to_string(block.get("input").unwrap_or(&Value::Null))
									.map_err(|e| CodecError::Malformed { dialect: "anthropic", source: e })?,
							}
						}));
					},
					Some("tool_result") => {
						let tool_call_id = block
							.get("tool_use_id")
							.and_then(|v| v.as_str())
							.unwrap_or_default()
							.to_string();
						let content = block
							.get("content")
							.map(flatten_system)
							.unwrap_or(Value::Null);
						out.push(ChatMessage {
							role: "tool".to_string(),
							content: Some(content),
							tool_calls: None,
							tool_call_id: Some(tool_call_id),
							name: None,
						});
					},
					_ => {},
				}
			}

			if !text_parts.is_empty() || tool_calls.is_empty() {
				out.insert(0, ChatMessage {
					role: m.role.clone(),
					content: if text_parts.is_empty() {
						None
					} else {
						Some(Value::String(text_parts.join("\n")))
					},
					tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls.clone()) },
					tool_call_id: None,
					name: None,
				});
			} else {
				out.insert(0, ChatMessage {
					role: m.role.clone(),
					content: None,
					tool_calls: Some(tool_calls),
					tool_call_id: None,
					name: None,
				});
			}

			Ok(out)
		},
	}
}

fn anthropic_tool_to_openai(tool: &Value) -> Value {
	json!({
		"type": "function",
		"function": {
			"name": tool.get("name").cloned().unwrap_or(Value::Null),
			"description": tool.get("description").cloned().unwrap_or(Value::Null),
			"parameters": tool.get("input_schema").cloned().unwrap_or(json!({"type": "object"})),
		}
	})
}

fn anthropic_tool_choice_to_openai(tc: &Value) -> Value {
	match tc.get("type").and_then(|t| t.as_str()) {
		Some("auto") => Value::String("auto".to_string()),
		Some("any") => Value::String("required".to_string()),
		Some("tool") => json!({
			"type": "function",
			"function": { "name": tc.get("name").cloned().unwrap_or(Value::Null) }
		}),
		_ => Value::String("auto".to_string()),
	}
}

/// Response direction: Chat Completions -> Anthropic, used when a request
/// arrived speaking Anthropic but had to be dispatched to an OpenAI-only
/// endpoint (spec.md §4.4's outbound leg of the pipeline).
pub fn chat_response_to_anthropic(resp: &ChatCompletionsResponse) -> Result<AnthropicResponse, CodecError> {
	let choice = resp
		.choices
		.first()
		.ok_or_else(|| CodecError::Transient("upstream response had no choices".to_string()))?;
	let message = choice.get("message").cloned().unwrap_or(Value::Null);
	let mut content = Vec::new();

	if let Some(text) = message.get("content").and_then(|c| c.as_str()) {
		if !text.is_empty() {
			content.push(json!({ "type": "text", "text": text }));
		}
	}
	if let Some(tool_calls) = message.get("tool_calls").and_then(|t| t.as_array()) {
		for call in tool_calls {
			let function = call.get("function").cloned().unwrap_or(Value::Null);
			let args: Value = function
				.get("arguments")
				.and_then(|a| a.as_str())
				.and_then(|s| serde_json::from_str(s).ok())
				.unwrap_or(Value::Null);
			content.push(json!({
				"type": "tool_use",
				"id": call.get("id").cloned().unwrap_or(Value::Null),
				"name": function.get("name").cloned().unwrap_or(Value::Null),
				"input": args,
			}));
		}
	}

	let stop_reason = match choice.get("finish_reason").and_then(|f| f.as_str()) {
		Some("tool_calls") => Some("tool_use".to_string()),
		Some("length") => Some("max_tokens".to_string()),
		Some("stop") => Some("end_turn".to_string()),
		other => other.map(|s| s.to_string()),
	};

	let usage = resp.usage.as_ref().map(|u| {
		json!({
			"input_tokens": u.get("prompt_tokens").cloned().unwrap_or(json!(0)),
			"output_tokens": u.get("completion_tokens").cloned().unwrap_or(json!(0)),
		})
	});

	Ok(AnthropicResponse {
		id: resp.id.clone(),
		response_type: "message".to_string(),
		role: "assistant".to_string(),
		model: resp.model.clone(),
		content,
		stop_reason,
		usage,
		rest: Map::new(),
	})
}

/// Request direction: Chat Completions -> Anthropic, used when a Chat- or
/// Codex-family client is dispatched to an Anthropic-only endpoint. The
/// leading `system` message (if any) is pulled out into Anthropic's
/// separate `system` field; everything else maps role-for-role.
pub fn chat_request_to_anthropic(req: &ChatCompletionsRequest, max_tokens: u32) -> Result<AnthropicRequest, CodecError> {
	let mut system = None;
	let mut messages = Vec::with_capacity(req.messages.len());

	for m in &req.messages {
		if m.role == "system" {
			system = m.content.clone();
			continue;
		}
		if let Some(tool_call_id) = &m.tool_call_id {
			messages.push(AnthropicMessage {
				role: "user".to_string(),
				content: AnthropicContent::Blocks(vec![json!({
					"type": "tool_result",
					"tool_use_id": tool_call_id,
					"content": m.content.clone().unwrap_or(Value::Null),
				})]),
			});
			continue;
		}
		if let Some(tool_calls) = &m.tool_calls {
			let mut blocks: Vec<Value> = Vec::new();
			if let Some(text) = m.content.as_ref().and_then(|c| c.as_str()) {
				if !text.is_empty() {
					blocks.push(json!({ "type": "text", "text": text }));
				}
			}
			for call in tool_calls {
				let function = call.get("function").cloned().unwrap_or(Value::Null);
				let input: Value = function
					.get("arguments")
					.and_then(|a| a.as_str())
					.and_then(|s| serde_json::from_str(s).ok())
					.unwrap_or(Value::Null);
				blocks.push(json!({
					"type": "tool_use",
					"id": call.get("id").cloned().unwrap_or(Value::Null),
					"name": function.get("name").cloned().unwrap_or(Value::Null),
					"input": input,
				}));
			}
			messages.push(AnthropicMessage {
				role: m.role.clone(),
				content: AnthropicContent::Blocks(blocks),
			});
			continue;
		}
		let text = m
			.content
			.as_ref()
			.and_then(|c| c.as_str())
			.unwrap_or_default()
			.to_string();
		messages.push(AnthropicMessage {
			role: m.role.clone(),
			content: AnthropicContent::Text(text),
		});
	}

	Ok(AnthropicRequest {
		model: req.model.clone(),
		max_tokens,
		messages,
		system,
		tools: req.tools.clone().map(|tools| tools.iter().map(openai_tool_to_anthropic).collect()),
		tool_choice: req.tool_choice.clone().map(|tc| openai_tool_choice_to_anthropic(&tc)),
		temperature: req.temperature,
		stream: req.stream,
		rest: req.rest.clone(),
	})
}

fn openai_tool_to_anthropic(tool: &Value) -> Value {
	let function = tool.get("function").cloned().unwrap_or(Value::Null);
	json!({
		"name": function.get("name").cloned().unwrap_or(Value::Null),
		"description": function.get("description").cloned().unwrap_or(Value::Null),
		"input_schema": function.get("parameters").cloned().unwrap_or(json!({"type": "object"})),
	})
}

fn openai_tool_choice_to_anthropic(tc: &Value) -> Value {
	match tc.as_str() {
		Some("auto") => json!({ "type": "auto" }),
		Some("required") => json!({ "type": "any" }),
		Some("none") => json!({ "type": "auto" }),
		_ => match tc.get("function").and_then(|f| f.get("name")) {
			Some(name) => json!({ "type": "tool", "name": name }),
			None => json!({ "type": "auto" }),
		},
	}
}

/// Response direction: Anthropic -> Chat Completions, used when the
/// request arrived as Chat/Codex but had to be dispatched to an
/// Anthropic-only endpoint.
pub fn anthropic_response_to_chat(resp: &AnthropicResponse) -> Result<ChatCompletionsResponse, CodecError> {
	let mut text_parts = Vec::new();
	let mut tool_calls = Vec::new();

	for block in &resp.content {
		match block.get("type").and_then(|t| t.as_str()) {
			Some("text") => {
				if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
					text_parts.push(t.to_string());
				}
			},
			Some("tool_use") => {
				tool_calls.push(json!({
					"id": block.get("id").cloned().unwrap_or(Value::Null),
					"type": "function",
					"function": {
						"name": block.get("name").cloned().unwrap_or(Value::Null),
						"arguments": serde_json::to_string(block.get("input").unwrap_or(&Value::Null))
							.map_err(|e| CodecError::Malformed { dialect: "anthropic", source: e })?,
					}
				}));
			},
			_ => {},
		}
	}

	let finish_reason = match resp.stop_reason.as_deref() {
		Some("tool_use") => "tool_calls",
		Some("max_tokens") => "length",
		Some("end_turn") | Some("stop_sequence") => "stop",
		_ => "stop",
	};

	let message = if tool_calls.is_empty() {
		json!({ "role": "assistant", "content": text_parts.join("\n") })
	} else {
		json!({
			"role": "assistant",
			"content": if text_parts.is_empty() { Value::Null } else { Value::String(text_parts.join("\n")) },
			"tool_calls": tool_calls,
		})
	};

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
			"message": message,
			"finish_reason": finish_reason,
		})],
		usage,
		rest: Map::new(),
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codec::types::anthropic::AnthropicMessage;

	#[test]
	fn translates_system_prompt_and_plain_text_message() {
		let req = AnthropicRequest {
			model: "claude-3-opus".into(),
			max_tokens: 256,
			messages: vec![AnthropicMessage {
				role: "user".into(),
				content: AnthropicContent::Text("hello".into()),
			}],
			system: Some(Value::String("be terse".into())),
			tools: None,
			tool_choice: None,
			temperature: None,
			stream: false,
			rest: Map::new(),
		};
		let chat = anthropic_request_to_chat(&req).unwrap();
		assert_eq!(chat.messages.len(), 2);
		assert_eq!(chat.messages[0].role, "system");
		assert_eq!(chat.messages[1].role, "user");
		assert_eq!(chat.max_tokens, Some(256));
	}

	#[test]
	fn translates_tool_use_block_to_openai_tool_call() {
		let req = AnthropicRequest {
			model: "claude-3-opus".into(),
			max_tokens: 256,
			messages: vec![AnthropicMessage {
				role: "assistant".into(),
				content: AnthropicContent::Blocks(vec![json!({
					"type": "tool_use",
					"id": "call_1",
					"name": "get_weather",
					"input": {"city": "nyc"}
				})]),
			}],
			system: None,
			tools: None,
			tool_choice: None,
			temperature: None,
			stream: false,
			rest: Map::new(),
		};
		let chat = anthropic_request_to_chat(&req).unwrap();
		let tool_calls = chat.messages[0].tool_calls.as_ref().unwrap();
		assert_eq!(tool_calls.len(), 1);
		assert_eq!(tool_calls[0]["function"]["name"], "get_weather");
	}

	#[test]
	fn chat_system_message_becomes_anthropic_system_field() {
		let req = ChatCompletionsRequest {
			model: "claude-3-opus".into(),
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
			max_tokens: Some(128),
			max_completion_tokens: None,
			tools: None,
			tool_choice: None,
			temperature: None,
			stream: false,
			rest: Map::new(),
		};
		let anth = chat_request_to_anthropic(&req, 128).unwrap();
		assert_eq!(anth.system, Some(Value::String("be terse".into())));
		assert_eq!(anth.messages.len(), 1);
		assert_eq!(anth.messages[0].role, "user");
	}

	#[test]
	fn anthropic_tool_use_response_becomes_chat_tool_call() {
		let resp = AnthropicResponse {
			id: "msg_1".into(),
			response_type: "message".into(),
			role: "assistant".into(),
			model: "claude-3-opus".into(),
			content: vec![json!({
				"type": "tool_use",
				"id": "call_1",
				"name": "get_weather",
				"input": {"city": "nyc"},
			})],
			stop_reason: Some("tool_use".into()),
			usage: Some(json!({"input_tokens": 5, "output_tokens": 2})),
			rest: Map::new(),
		};
		let chat = anthropic_response_to_chat(&resp).unwrap();
		let message = &chat.choices[0]["message"];
		assert_eq!(message["tool_calls"][0]["function"]["name"], "get_weather");
		assert_eq!(chat.choices[0]["finish_reason"], "tool_calls");
	}
}
