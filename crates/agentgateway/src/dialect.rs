//! Wire dialects and client kinds. Grounded in the teacher's
//! `llm::RouteType` / `llm::InputFormat` split (`llm/mod.rs`): one enum for
//! "what shape is this body" and a looser one for "what tool sent it", used
//! only for telemetry and header-matching heuristics.

use serde::{Deserialize, Serialize};

/// The wire shape of a request or response body. See spec.md GLOSSARY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
	/// Anthropic `/v1/messages`.
	Anthropic,
	/// OpenAI `/v1/chat/completions`.
	OpenAiChat,
	/// OpenAI `/responses` (Codex).
	OpenAiResponses,
	/// Gemini `/v1beta/...`.
	Gemini,
}

impl Dialect {
	pub fn as_str(self) -> &'static str {
		match self {
			Dialect::Anthropic => "anthropic",
			Dialect::OpenAiChat => "openai_chat",
			Dialect::OpenAiResponses => "openai_responses",
			Dialect::Gemini => "gemini",
		}
	}

	/// Whether this crate ships a bidirectional codec for `self -> other`.
	/// Gemini is reachable only natively (see SPEC_FULL.md "Codec
	/// collaborator").
	pub fn has_codec_to(self, other: Dialect) -> bool {
		use Dialect::*;
		if self == other {
			return true;
		}
		matches!(
			(self, other),
			(Anthropic, OpenAiChat)
				| (OpenAiChat, Anthropic)
				| (OpenAiResponses, OpenAiChat)
				| (OpenAiChat, OpenAiResponses)
				| (OpenAiResponses, Anthropic)
				| (Anthropic, OpenAiResponses)
		)
	}
}

/// Advisory classification of the calling tool, set by the Format Detector
/// (C1) from path/header/user-agent hints. Never affects routing
/// correctness, only logging and a couple of Codex-specific behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
	Codex,
	ClaudeCode,
	Generic,
	#[default]
	Unknown,
}
