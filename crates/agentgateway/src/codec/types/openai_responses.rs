//! OpenAI Responses API wire types (spec.md glossary: "OpenAI Responses",
//! the dialect Codex-family clients speak natively).

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesRequest {
	pub model: String,
	/// Responses uses `input` (a string or a typed item list) where Chat
	/// Completions uses `messages`.
	pub input: Value,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub instructions: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_output_tokens: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tools: Option<Vec<Value>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub tool_choice: Option<Value>,
	#[serde(default, skip_serializing_if = "std::ops::Not::not")]
	pub stream: bool,
	#[serde(flatten)]
	pub rest: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesResponse {
	pub id: String,
	pub model: String,
	pub output: Vec<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub usage: Option<Value>,
	#[serde(flatten)]
	pub rest: serde_json::Map<String, Value>,
}
