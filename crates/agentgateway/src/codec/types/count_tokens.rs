//! Anthropic `POST /v1/messages/count_tokens` wire types — a thin sibling
//! of [`super::anthropic::AnthropicRequest`] that carries no `max_tokens`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountTokensRequest {
	pub model: String,
	#[serde(default)]
	pub messages: Vec<super::anthropic::AnthropicMessage>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub system: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Value>>,
	#[serde(flatten)]
	pub rest: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountTokensResponse {
	pub input_tokens: u32,
}
