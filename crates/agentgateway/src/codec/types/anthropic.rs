//! Anthropic Messages API wire types (spec.md glossary: "Anthropic
//! Messages"). Only the fields the dispatch pipeline and codecs need are
//! typed; everything else passes through `rest`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicRequest {
	pub model: String,
	pub max_tokens: u32,
	#[serde(default)]
	pub messages: Vec<AnthropicMessage>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub system: Option<Value>,
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
pub struct AnthropicMessage {
	pub role: String,
	pub content: AnthropicContent,
}

/// Anthropic message content is either a bare string or a list of typed
/// blocks (`text`, `tool_use`, `tool_result`, `image`, ...). We model the
/// block list loosely as `Value` since the conversion logic only needs to
/// pattern-match on `"type"` and a handful of fields per block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnthropicContent {
	Text(String),
	Blocks(Vec<Value>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicResponse {
	pub id: String,
	#[serde(rename = "type")]
	pub response_type: String,
	pub role: String,
	pub model: String,
	pub content: Vec<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stop_reason: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<Value>,
	#[serde(flatten)]
	pub rest: serde_json::Map<String, Value>,
}
