//! Endpoint-list & config collaborator (spec.md §6): "provides the initial
//! endpoint list and accepts hot-swap replacements; the core never reads
//! the config file directly." This module is the thin YAML loader
//! SPEC_FULL.md keeps in scope (schema versioning and file-watching
//! hot-reload are the out-of-scope "config file persistence format",
//! spec.md §1).
//!
//! Grounded on the teacher's `RawConfig`/`serde_yaml` loading pattern in
//! `lib.rs`: deny unknown fields so a typo in an operator's YAML fails
//! loudly at startup rather than silently dropping a field.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::endpoint::EndpointConfig;
use crate::error::GatewayError;

#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
struct RawConfig {
	endpoints: Vec<EndpointConfig>,
}

/// The "Endpoint-list & config collaborator" interface: something the core
/// can ask for an initial (and, for hot-swap-capable sources, repeated)
/// `Vec<EndpointConfig>` without caring where it came from.
pub trait EndpointSource: Send + Sync {
	fn load(&self) -> Result<Vec<EndpointConfig>, GatewayError>;
}

/// Parses an endpoint list from a YAML file once at construction time and
/// hands back the same parsed list on every `load()` call. No file
/// watching, no hot-reload — that's the out-of-scope "config file
/// persistence format" (spec.md §1); an operator wanting hot-swap would
/// implement `EndpointSource` against their own watcher and call
/// `EndpointRegistry::replace_all` on change.
pub struct StaticEndpointSource {
	endpoints: Vec<EndpointConfig>,
}

impl StaticEndpointSource {
	pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
		let path = path.as_ref();
		let contents = fs_err::read_to_string(path).map_err(|e| GatewayError::Config(format!("reading {}: {e}", path.display())))?;
		Self::from_yaml_str(&contents)
	}

	pub fn from_yaml_str(yaml: &str) -> Result<Self, GatewayError> {
		let raw: RawConfig = serde_yaml::from_str(yaml).map_err(|e| GatewayError::Config(format!("parsing config: {e}")))?;
		Ok(StaticEndpointSource { endpoints: raw.endpoints })
	}
}

impl EndpointSource for StaticEndpointSource {
	fn load(&self) -> Result<Vec<EndpointConfig>, GatewayError> {
		Ok(self.endpoints.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = r#"
endpoints:
  - id: anthropic-primary
    name: anthropic-primary
    enabled: true
    priority: 10
    url_anthropic: https://api.anthropic.com
    url_openai: null
    url_gemini: null
    endpoint_type: anthropic
    auth_type: api_key
    auth_value: sk-test
    tags: []
    model_rewrite: []
    parameter_overrides: {}
    header_overrides: {}
"#;

	#[test]
	fn parses_minimal_endpoint_list() {
		let source = StaticEndpointSource::from_yaml_str(SAMPLE).unwrap();
		let endpoints = source.load().unwrap();
		assert_eq!(endpoints.len(), 1);
		assert_eq!(endpoints[0].id, "anthropic-primary");
		assert!(endpoints[0].enabled);
	}

	#[test]
	fn rejects_unknown_top_level_field() {
		let bad = format!("{SAMPLE}\nextraField: true\n");
		assert!(StaticEndpointSource::from_yaml_str(&bad).is_err());
	}

	#[test]
	fn rejects_malformed_yaml() {
		assert!(StaticEndpointSource::from_yaml_str("not: [valid").is_err());
	}
}
