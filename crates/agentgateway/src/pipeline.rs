//! C4 — Request Pipeline. Per-attempt transformation chain run before
//! every outbound call (spec.md §4.3): endpoint-dialect choice → model
//! rewrite → dialect conversion → provider hacks → learned-param removal →
//! configured overrides → auth header. Each stage that actually changed
//! the body is recorded in `ctx.conversion_stages`.

use std::borrow::Cow;

use bytes::Bytes;
use http::HeaderMap;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue};
use md5::{Digest, Md5};
use serde_json::Value;

use crate::cache::{RequestCache, RewrittenModel};
use crate::codec;
use crate::codec::providers;
use crate::context::{ConversionStage, RequestContext};
use crate::dialect::Dialect;
use crate::endpoint::config::AuthType;
use crate::endpoint::runtime::{DetectedAuthHeader, OpenAiPreference};
use crate::endpoint::Endpoint;
use crate::error::GatewayError;

/// A fully assembled outbound request, ready for the executor (C5).
pub struct PreparedRequest {
	pub endpoint_dialect: Dialect,
	pub path: String,
	pub body: Bytes,
	pub headers: HeaderMap,
}

pub fn run(endpoint: &Endpoint, ctx: &mut RequestContext, cache: &mut RequestCache) -> Result<PreparedRequest, GatewayError> {
	// Step 1: endpoint-dialect choice.
	let learned = endpoint.runtime.learned_snapshot();
	let endpoint_dialect = choose_upstream_dialect(&endpoint.config, ctx.detected_dialect, learned.openai_preference);
	let path = path_for_dialect(endpoint_dialect);

	ctx.original_model = codec::peek_model(&ctx.original_body);

	// Step 2: model rewrite, memoized per endpoint name.
	let (model_rewritten_body, rewritten_model) = apply_model_rewrite(endpoint, ctx, cache)?;

	// Step 3: dialect conversion, memoized by content hash.
	let needs_conversion = ctx.detected_dialect != endpoint_dialect;
	ctx.needs_conversion = needs_conversion;
	let converted_body = if needs_conversion {
		let max_tokens = default_max_tokens(endpoint, ctx);
		let operation = conversion_operation_tag(ctx.detected_dialect, endpoint_dialect);
		let body = if let Some(cached) = cache.get_conversion(operation, &model_rewritten_body) {
			cached
		} else {
			let converted = codec::convert_request(ctx.detected_dialect, endpoint_dialect, &model_rewritten_body, max_tokens)?;
			cache.put_conversion(operation, &model_rewritten_body, converted.clone());
			converted
		};
		ctx.conversion_stages.push(ConversionStage::RequestBody);
		body
	} else {
		model_rewritten_body
	};

	// `ensureOpenAIStreamTrue`: a Codex -> Chat conversion forces streaming
	// on the upstream body even if the client didn't request it, since the
	// Responses-shaped SSE translation needs a stream to transcode from
	// (spec.md §9 open question iii keeps this narrow to that one case).
	let converted_body = if ctx.detected_dialect == Dialect::OpenAiResponses && endpoint_dialect == Dialect::OpenAiChat {
		force_stream_true(&converted_body)?
	} else {
		converted_body
	};

	let mut value: Value = serde_json::from_slice(&converted_body).map_err(GatewayError::BodyBuild)?;

	// Step 4: provider hacks, OpenAI upstreams only.
	if matches!(endpoint_dialect, Dialect::OpenAiChat | Dialect::OpenAiResponses) {
		apply_openai_user_hash(&mut value);
		apply_gpt5_quirks(&mut value, rewritten_model.as_deref());
	}

	// Step 5: learned unsupported parameter removal.
	if let Value::Object(map) = &mut value {
		for name in &learned.learned_unsupported_params {
			map.remove(name);
		}
	}

	// Step 6: configured overrides — parameters, then headers.
	apply_parameter_overrides(&mut value, endpoint);
	let mut headers = HeaderMap::new();
	apply_header_overrides(&mut headers, endpoint)?;

	// Step 7: auth header assembly.
	assemble_auth_header(endpoint, ctx, endpoint_dialect, &learned, &mut headers)?;
	apply_dialect_default_headers(&mut headers, endpoint_dialect);

	let body = Bytes::from(serde_json::to_vec(&value).map_err(GatewayError::BodyBuild)?);

	Ok(PreparedRequest {
		endpoint_dialect,
		path,
		body,
		headers,
	})
}

/// Prefer a native URL for the requested dialect; otherwise prefer the
/// endpoint's declared hint (adjusted by the learned `openai_preference`,
/// so a Responses endpoint that has latched `native_codex_format = no`
/// stops being offered as a Responses target); otherwise any URL a codec
/// can bridge from.
fn choose_upstream_dialect(config: &crate::endpoint::EndpointConfig, requested: Dialect, preference: OpenAiPreference) -> Dialect {
	// A latched `openai_preference = chat_completions` (spec.md §4.8, set
	// when `native_codex_format` flips to `no`) must steer a Responses
	// request to Chat Completions even though both dialects share
	// `url_openai` and `has_url_for_format` would otherwise let the native
	// URL early-return fire (spec.md §4.3 step 1, §8 scenario 2, P4).
	if requested == Dialect::OpenAiResponses && preference == OpenAiPreference::ChatCompletions && config.has_url_for_format(Dialect::OpenAiChat) {
		return Dialect::OpenAiChat;
	}

	if config.has_url_for_format(requested) {
		return requested;
	}

	let mut hinted = config.endpoint_type;
	if hinted == Dialect::OpenAiResponses && preference == OpenAiPreference::ChatCompletions {
		hinted = Dialect::OpenAiChat;
	}
	if config.has_url_for_format(hinted) && requested.has_codec_to(hinted) {
		return hinted;
	}

	for d in [Dialect::Anthropic, Dialect::OpenAiChat, Dialect::OpenAiResponses, Dialect::Gemini] {
		if config.has_url_for_format(d) && requested.has_codec_to(d) {
			return d;
		}
	}
	requested
}

fn path_for_dialect(d: Dialect) -> String {
	match d {
		Dialect::Anthropic => providers::ANTHROPIC.chat_path.to_string(),
		Dialect::OpenAiChat => providers::OPENAI_CHAT.chat_path.to_string(),
		Dialect::OpenAiResponses => providers::OPENAI_RESPONSES.chat_path.to_string(),
		Dialect::Gemini => providers::GEMINI.chat_path.to_string(),
	}
}

fn conversion_operation_tag(from: Dialect, to: Dialect) -> &'static str {
	match (from, to) {
		(Dialect::Anthropic, Dialect::OpenAiChat) => "anthropic_json->openai_json",
		(Dialect::OpenAiChat, Dialect::Anthropic) => "openai_json->anthropic_json",
		(Dialect::OpenAiResponses, Dialect::OpenAiChat) => "responses_json->chat_json",
		(Dialect::OpenAiChat, Dialect::OpenAiResponses) => "chat_json->responses_json",
		(Dialect::Anthropic, Dialect::OpenAiResponses) => "anthropic_json->responses_json",
		(Dialect::OpenAiResponses, Dialect::Anthropic) => "responses_json->anthropic_json",
		_ => "passthrough",
	}
}

fn default_max_tokens(endpoint: &Endpoint, ctx: &RequestContext) -> u32 {
	serde_json::from_slice::<Value>(&ctx.original_body)
		.ok()
		.and_then(|v| v.get("max_tokens").and_then(|m| m.as_u64()))
		.map(|m| m as u32)
		.unwrap_or(endpoint.config.parameter_overrides.get("max_tokens").and_then(|v| v.as_ref()).and_then(|v| v.as_u64()).map(|m| m as u32).unwrap_or(4096))
}

fn apply_model_rewrite(endpoint: &Endpoint, ctx: &mut RequestContext, cache: &mut RequestCache) -> Result<(Bytes, Option<String>), GatewayError> {
	if let Some(cached) = cache.get_model_rewrite(endpoint.name()) {
		ctx.rewritten_model = Some(cached.rewritten_model.clone());
		return Ok((cached.body.clone(), Some(cached.rewritten_model.clone())));
	}

	let mut value: Value = serde_json::from_slice(&ctx.original_body).map_err(GatewayError::BodyBuild)?;
	let original_model = value.get("model").and_then(|m| m.as_str()).map(|s| s.to_string());

	let Some(original_model) = original_model else {
		return Ok((ctx.original_body.clone(), None));
	};

	let Some(target) = endpoint.config.rewrite_model(&original_model) else {
		return Ok((ctx.original_body.clone(), None));
	};

	if let Value::Object(map) = &mut value {
		map.insert("model".to_string(), Value::String(target.to_string()));
	}
	let body = Bytes::from(serde_json::to_vec(&value).map_err(GatewayError::BodyBuild)?);
	ctx.rewritten_model = Some(target.to_string());
	cache.put_model_rewrite(endpoint.name(), RewrittenModel {
		original_model,
		rewritten_model: target.to_string(),
		body: body.clone(),
	});
	Ok((body, Some(target.to_string())))
}

fn force_stream_true(body: &[u8]) -> Result<Bytes, GatewayError> {
	let mut value: Value = serde_json::from_slice(body).map_err(GatewayError::BodyBuild)?;
	if let Value::Object(map) = &mut value {
		map.insert("stream".to_string(), Value::Bool(true));
	}
	Ok(Bytes::from(serde_json::to_vec(&value).map_err(GatewayError::BodyBuild)?))
}

/// If `user` is a string longer than 64 bytes, replace it with
/// `"hashed-" + md5(user)` so the upstream never sees a raw, possibly
/// identifying value beyond that length (spec.md §4.3 step 4).
fn apply_openai_user_hash(value: &mut Value) {
	let Value::Object(map) = value else { return };
	let Some(user) = map.get("user").and_then(|u| u.as_str()) else {
		return;
	};
	if user.len() <= 64 {
		return;
	}
	let mut hasher = Md5::new();
	hasher.update(user.as_bytes());
	let digest = hasher.finalize();
	let hashed = format!("hashed-{}", hex_encode(&digest));
	map.insert("user".to_string(), Value::String(hashed));
}

fn hex_encode(bytes: &[u8]) -> String {
	bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// `gpt-5` and `gpt-5-codex` reject any `temperature` but `1` and use
/// `max_completion_tokens` instead of `max_tokens` (spec.md §4.3 step 4).
fn apply_gpt5_quirks(value: &mut Value, rewritten_model: Option<&str>) {
	let model = rewritten_model
		.map(|s| s.to_string())
		.or_else(|| value.get("model").and_then(|m| m.as_str()).map(|s| s.to_string()));
	let Some(model) = model else { return };
	if model != "gpt-5" && model != "gpt-5-codex" {
		return;
	}
	let Value::Object(map) = value else { return };
	map.insert("temperature".to_string(), serde_json::json!(1));
	if let Some(max_tokens) = map.remove("max_tokens") {
		map.insert("max_completion_tokens".to_string(), max_tokens);
	}
}

fn apply_parameter_overrides(value: &mut Value, endpoint: &Endpoint) {
	let Value::Object(map) = value else { return };
	for (key, override_value) in &endpoint.config.parameter_overrides {
		match override_value {
			Some(v) => {
				map.insert(key.clone(), v.clone());
			},
			None => {
				map.remove(key);
			},
		}
	}
}

fn apply_header_overrides(headers: &mut HeaderMap, endpoint: &Endpoint) -> Result<(), GatewayError> {
	for (key, override_value) in &endpoint.config.header_overrides {
		let name: HeaderName = key
			.parse()
			.map_err(|_| GatewayError::Config(format!("invalid override header name: {key}")))?;
		match override_value {
			Some(v) => {
				let value = HeaderValue::from_str(v).map_err(|source| GatewayError::InvalidHeader { name: "header_override", source })?;
				headers.insert(name, value);
			},
			None => {
				headers.remove(name);
			},
		}
	}
	Ok(())
}

fn set_bearer(headers: &mut HeaderMap, token: &str) -> Result<(), GatewayError> {
	let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|source| GatewayError::InvalidHeader {
		name: "Authorization",
		source,
	})?;
	headers.insert(AUTHORIZATION, value);
	Ok(())
}

fn set_api_key(headers: &mut HeaderMap, token: &str) -> Result<(), GatewayError> {
	let value = HeaderValue::from_str(token).map_err(|source| GatewayError::InvalidHeader { name: "x-api-key", source })?;
	headers.insert(HeaderName::from_static("x-api-key"), value);
	Ok(())
}

fn assemble_auth_header(
	endpoint: &Endpoint,
	ctx: &mut RequestContext,
	endpoint_dialect: Dialect,
	learned: &crate::endpoint::runtime::LearnedState,
	headers: &mut HeaderMap,
) -> Result<(), GatewayError> {
	let token = &endpoint.config.auth_value;

	if let Some(detected) = learned.detected_auth_header {
		match detected {
			DetectedAuthHeader::Authorization => set_bearer(headers, token)?,
			DetectedAuthHeader::ApiKey => set_api_key(headers, token)?,
		}
	} else {
		match endpoint.config.auth_type {
			AuthType::ApiKey => {
				set_api_key(headers, token)?;
				set_bearer(headers, token)?;
			},
			AuthType::AuthToken | AuthType::OAuth => set_bearer(headers, token)?,
			AuthType::Auto => {
				set_bearer(headers, token)?;
				ctx.auth_method_tried = true;
			},
		}
	}

	if endpoint.config.auth_type == AuthType::OAuth
		&& endpoint_dialect == Dialect::Anthropic
		&& is_api_anthropic_host(endpoint.config.url_anthropic.as_deref())
	{
		prepend_anthropic_beta(headers, "oauth-2025-04-20")?;
	}

	Ok(())
}

fn is_api_anthropic_host(url: Option<&str>) -> bool {
	url.map(|u| u.contains("api.anthropic.com")).unwrap_or(false)
}

fn prepend_anthropic_beta(headers: &mut HeaderMap, prefix: &str) -> Result<(), GatewayError> {
	let name = HeaderName::from_static("anthropic-beta");
	let existing = headers.get(&name).and_then(|v| v.to_str().ok()).map(|s| s.to_string());
	let merged = match existing {
		Some(existing) if !existing.is_empty() => Cow::Owned(format!("{prefix},{existing}")),
		_ => Cow::Borrowed(prefix),
	};
	let value = HeaderValue::from_str(&merged).map_err(|source| GatewayError::InvalidHeader {
		name: "anthropic-beta",
		source,
	})?;
	headers.insert(name, value);
	Ok(())
}

/// Dialect-specific defaults applied only if the operator's overrides (or
/// auth assembly) didn't already set them — "preserve `anthropic-version`
/// when present" (spec.md §6).
fn apply_dialect_default_headers(headers: &mut HeaderMap, endpoint_dialect: Dialect) {
	if endpoint_dialect != Dialect::Anthropic {
		return;
	}
	if !headers.contains_key(CONTENT_TYPE) {
		headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
	}
	let version_name = HeaderName::from_static("anthropic-version");
	if !headers.contains_key(&version_name) {
		headers.insert(version_name, HeaderValue::from_static("2023-06-01"));
	}
}

#[cfg(test)]
mod tests {
	use bytes::Bytes;

	use super::*;
	use crate::dialect::ClientType;
	use crate::endpoint::EndpointConfig;

	fn anthropic_endpoint() -> Endpoint {
		Endpoint::new(EndpointConfig {
			id: "e1".into(),
			name: "e1".into(),
			enabled: true,
			priority: 0,
			url_anthropic: None,
			url_openai: Some("https://api.openai.com".into()),
			url_gemini: None,
			endpoint_type: Dialect::OpenAiChat,
			auth_type: AuthType::ApiKey,
			auth_value: "sk-test".into(),
			oauth_refresh: None,
			tags: Default::default(),
			model_rewrite: vec![],
			parameter_overrides: Default::default(),
			header_overrides: Default::default(),
			error_pattern_rules: Default::default(),
		})
	}

	#[test]
	fn converts_anthropic_request_to_openai_chat_and_sets_auth() {
		let endpoint = anthropic_endpoint();
		let body = Bytes::from_static(br#"{"model":"claude-3-opus","max_tokens":256,"messages":[{"role":"user","content":"hi"}]}"#);
		let mut ctx = RequestContext::new("/v1/messages", body, Dialect::Anthropic, ClientType::ClaudeCode);
		let mut cache = RequestCache::new();
		let prepared = run(&endpoint, &mut ctx, &mut cache).unwrap();
		assert_eq!(prepared.endpoint_dialect, Dialect::OpenAiChat);
		assert_eq!(prepared.path, "/v1/chat/completions");
		assert!(prepared.headers.get(AUTHORIZATION).is_some());
		assert!(prepared.headers.get("x-api-key").is_some());
		let parsed: Value = serde_json::from_slice(&prepared.body).unwrap();
		assert_eq!(parsed["messages"][0]["role"], "user");
	}

	#[test]
	fn gpt5_model_forces_temperature_and_renames_max_tokens() {
		let mut endpoint = anthropic_endpoint();
		std::sync::Arc::get_mut(&mut endpoint.config).unwrap().model_rewrite.push(crate::endpoint::ModelRewriteRule {
			source: "claude-3-*".into(),
			target: "gpt-5".into(),
		});
		let body = Bytes::from_static(br#"{"model":"claude-3-opus","max_tokens":256,"messages":[{"role":"user","content":"hi"}]}"#);
		let mut ctx = RequestContext::new("/v1/messages", body, Dialect::Anthropic, ClientType::ClaudeCode);
		let mut cache = RequestCache::new();
		let prepared = run(&endpoint, &mut ctx, &mut cache).unwrap();
		let parsed: Value = serde_json::from_slice(&prepared.body).unwrap();
		assert_eq!(parsed["temperature"], 1);
		assert!(parsed.get("max_tokens").is_none());
		assert_eq!(parsed["max_completion_tokens"], 256);
	}

	#[test]
	fn learned_unsupported_param_is_stripped() {
		let endpoint = anthropic_endpoint();
		endpoint.runtime.add_unsupported_params(["tool_choice".to_string()]);
		let body = Bytes::from_static(br#"{"model":"claude-3-opus","max_tokens":256,"tool_choice":"auto","messages":[]}"#);
		let mut ctx = RequestContext::new("/v1/messages", body, Dialect::Anthropic, ClientType::ClaudeCode);
		let mut cache = RequestCache::new();
		let prepared = run(&endpoint, &mut ctx, &mut cache).unwrap();
		let parsed: Value = serde_json::from_slice(&prepared.body).unwrap();
		assert!(parsed.get("tool_choice").is_none());
	}

	#[test]
	fn anthropic_upstream_gets_default_version_header() {
		let endpoint = Endpoint::new(EndpointConfig {
			id: "e2".into(),
			name: "e2".into(),
			enabled: true,
			priority: 0,
			url_anthropic: Some("https://api.anthropic.com".into()),
			url_openai: None,
			url_gemini: None,
			endpoint_type: Dialect::Anthropic,
			auth_type: AuthType::AuthToken,
			auth_value: "tok".into(),
			oauth_refresh: None,
			tags: Default::default(),
			model_rewrite: vec![],
			parameter_overrides: Default::default(),
			header_overrides: Default::default(),
			error_pattern_rules: Default::default(),
		});
		let body = Bytes::from_static(br#"{"model":"claude-3-opus","max_tokens":256,"messages":[]}"#);
		let mut ctx = RequestContext::new("/v1/messages", body, Dialect::Anthropic, ClientType::ClaudeCode);
		let mut cache = RequestCache::new();
		let prepared = run(&endpoint, &mut ctx, &mut cache).unwrap();
		assert_eq!(prepared.headers.get("anthropic-version").unwrap(), "2023-06-01");
	}
}
