//! Per-dialect default host/path constants, grounded on the teacher's
//! `llm/anthropic.rs` / `llm/openai.rs` / `llm/gemini.rs` provider structs
//! (each a thin `DEFAULT_HOST` + `path()` pair).

pub struct Provider {
	pub default_host: &'static str,
	pub chat_path: &'static str,
}

pub const ANTHROPIC: Provider = Provider {
	default_host: "https://api.anthropic.com",
	chat_path: "/v1/messages",
};

pub const OPENAI_CHAT: Provider = Provider {
	default_host: "https://api.openai.com",
	chat_path: "/v1/chat/completions",
};

pub const OPENAI_RESPONSES: Provider = Provider {
	default_host: "https://api.openai.com",
	chat_path: "/v1/responses",
};

pub const GEMINI: Provider = Provider {
	default_host: "https://generativelanguage.googleapis.com",
	chat_path: "/v1beta/models",
};
