//! OpenAI Chat Completions wire types (spec.md glossary).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionsRequest {
	pub model: String,
	#[serde(default)]
	pub messages: Vec<ChatMessage>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_completion_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Value>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub temperature: Option<f64>,
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub stream: bool,
	#[serde(flatten)]
	pub rest: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
	pub role: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub content: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_calls: Option<Vec<Value>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_call_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionsResponse {
	pub id: String,
	pub model: String,
	pub choices: Vec<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<Value>,
	#[serde(flatten)]
	pub rest: serde_json::Map<String, Value>,
}
