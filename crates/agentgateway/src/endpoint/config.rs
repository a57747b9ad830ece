//! Immutable endpoint configuration, loaded once from the
//! endpoint-list/config collaborator (spec.md §6). Split from the mutable
//! learned/blacklist state in [`super::runtime`] per the §9 redesign flag:
//! "shared mutable `Endpoint` struct holding both config and learned state"
//! is replaced with `EndpointConfig` (this module, from config) +
//! `EndpointRuntime` (learned + blacklist + stats) joined by `id`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
	ApiKey,
	AuthToken,
	OAuth,
	Auto,
}

/// One `source glob -> target model` rule. Matching is first-match-wins in
/// declaration order (spec.md §4.3 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRewriteRule {
	pub source: String,
	pub target: String,
}

impl ModelRewriteRule {
	/// Glob-style match: `*` matches any run of characters, everything else
	/// is literal. Matches the teacher's informal "glob-style" language in
	/// spec.md without pulling in a full glob engine for a single-wildcard
	/// case.
	pub fn matches(&self, model: &str) -> bool {
		glob_match(&self.source, model)
	}
}

fn glob_match(pattern: &str, text: &str) -> bool {
	fn inner(p: &[u8], t: &[u8]) -> bool {
		match (p.first(), t.first()) {
			(None, None) => true,
			(Some(b'*'), _) => {
				// try consuming 0..=len(t) chars under the star
				for i in 0..=t.len() {
					if inner(&p[1..], &t[i..]) {
						return true;
					}
				}
				false
			},
			(Some(pc), Some(tc)) if pc == tc => inner(&p[1..], &t[1..]),
			_ => false,
		}
	}
	inner(pattern.as_bytes(), text.as_bytes())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
	RetryEndpoint,
	SwitchEndpoint,
}

/// An operator-configured override of the classifier's default action
/// table (spec.md §4.6: "Explicit upstream-pattern match (operator-
/// configured regex rule hit) -> the rule's declared action ..., bounded
/// by the rule's max_retries"). The pattern is matched against the
/// upstream error text (transport error message or captured response
/// body) before the classifier's default per-`ErrorKind` table is
/// consulted, so an operator can carve out a vendor-specific error shape
/// without waiting on a crate-level classifier change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPatternRule {
	pub pattern: String,
	pub action: RuleAction,
	#[serde(default = "default_rule_max_retries")]
	pub max_retries: u32,
}

fn default_rule_max_retries() -> u32 {
	1
}

/// An oauth refresh hook is a pluggable collaborator (spec.md §9:
/// "GetAuthHeader(refreshCallback) hook that a collaborator may
/// implement"); we only keep the static config needed to know *that* an
/// endpoint wants OAuth, not the token exchange itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthRefreshConfig {
	pub client_id: String,
	#[serde(default)]
	pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
	pub id: String,
	pub name: String,
	#[serde(default = "default_true")]
	pub enabled: bool,
	#[serde(default)]
	pub priority: i32,

	pub url_anthropic: Option<String>,
	pub url_openai: Option<String>,
	pub url_gemini: Option<String>,

	/// Declared primary dialect; a weak hint only (spec.md §3).
	pub endpoint_type: Dialect,

	pub auth_type: AuthType,
	pub auth_value: String,
	#[serde(default)]
	pub oauth_refresh: Option<OAuthRefreshConfig>,

	#[serde(default)]
	pub tags: BTreeSet<String>,

	#[serde(default)]
	pub model_rewrite: Vec<ModelRewriteRule>,

	/// Empty (`null`) value means "delete this key from the body."
	#[serde(default)]
	pub parameter_overrides: indexmap::IndexMap<String, Option<serde_json::Value>>,
	/// Empty (`null`) value means "delete this header."
	#[serde(default)]
	pub header_overrides: indexmap::IndexMap<String, Option<String>>,

	#[serde(default)]
	pub error_pattern_rules: Vec<ErrorPatternRule>,
}

fn default_true() -> bool {
	true
}

impl EndpointConfig {
	/// `HasURLForFormat` (spec.md §4.2): true iff this endpoint holds a
	/// non-empty URL natively speaking `d`.
	pub fn has_url_for_format(&self, d: Dialect) -> bool {
		match d {
			Dialect::Anthropic => self.url_anthropic.is_some(),
			Dialect::OpenAiChat | Dialect::OpenAiResponses => self.url_openai.is_some(),
			Dialect::Gemini => self.url_gemini.is_some(),
		}
	}

	/// `IsCompatibleWithFormat` (spec.md §4.2): true iff *any* URL is
	/// present and there's a codec bridging `d` to that URL's dialect (or
	/// the endpoint has `d` natively). Gemini has no outbound codec (see
	/// SPEC_FULL.md), so it is compatible only when requested natively.
	pub fn is_compatible_with_format(&self, d: Dialect) -> bool {
		if self.has_url_for_format(d) {
			return true;
		}
		for native in [Dialect::Anthropic, Dialect::OpenAiChat, Dialect::Gemini] {
			if native == d {
				continue;
			}
			if self.has_url_for_format(native) && d.has_codec_to(native) {
				return true;
			}
		}
		false
	}

	/// At least one upstream URL configured (invariant precondition for
	/// usability, spec.md §3).
	pub fn has_any_url(&self) -> bool {
		self.url_anthropic.is_some() || self.url_openai.is_some() || self.url_gemini.is_some()
	}

	/// First matching model rewrite rule, if any.
	pub fn rewrite_model<'a>(&'a self, model: &str) -> Option<&'a str> {
		self
			.model_rewrite
			.iter()
			.find(|r| r.matches(model))
			.map(|r| r.target.as_str())
	}

	/// First `error_pattern_rules` entry whose regex matches `text`
	/// (transport error message or captured response body), in declaration
	/// order. An unparseable pattern never matches rather than panicking —
	/// a typo in operator config should not take an endpoint's error
	/// handling down with it.
	pub fn matching_error_pattern_rule(&self, text: &str) -> Option<&ErrorPatternRule> {
		self
			.error_pattern_rules
			.iter()
			.find(|rule| regex::Regex::new(&rule.pattern).map(|re| re.is_match(text)).unwrap_or(false))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn glob_star_suffix() {
		assert!(glob_match("claude-3-*", "claude-3-opus"));
		assert!(!glob_match("claude-3-*", "claude-2-opus"));
	}

	#[test]
	fn glob_exact() {
		assert!(glob_match("gpt-5", "gpt-5"));
		assert!(!glob_match("gpt-5", "gpt-5-codex"));
	}

	#[test]
	fn compatible_via_codec_when_no_native_url() {
		let cfg = EndpointConfig {
			id: "e1".into(),
			name: "e1".into(),
			enabled: true,
			priority: 0,
			url_anthropic: None,
			url_openai: Some("https://api.openai.com".into()),
			url_gemini: None,
			endpoint_type: Dialect::OpenAiChat,
			auth_type: AuthType::ApiKey,
			auth_value: "k".into(),
			oauth_refresh: None,
			tags: Default::default(),
			model_rewrite: vec![],
			parameter_overrides: Default::default(),
			header_overrides: Default::default(),
			error_pattern_rules: Default::default(),
		};
		assert!(cfg.is_compatible_with_format(Dialect::Anthropic));
		assert!(!cfg.is_compatible_with_format(Dialect::Gemini));
	}
}
