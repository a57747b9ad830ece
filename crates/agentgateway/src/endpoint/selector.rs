//! C3 — Endpoint Selector. Chooses the ordered candidate pools the retry
//! controller (C7) walks for a given request (spec.md §4.2, §4.6).
//!
//! Selection runs against a registry snapshot and produces two pools,
//! kept separate (not merged) because the outer retry loop walks the
//! tagged pool to exhaustion before falling back to the universal pool,
//! and the `all_endpoints_failed` error body (spec.md §6) reports active
//! and total counts per pool independently:
//!   - `tagged`: endpoints whose `tags ⊇ required_tags`, only populated
//!     when `required_tags` is non-empty (spec.md §4.2 Phase A).
//!   - `universal`: endpoints with empty `tags`, always computed (spec.md
//!     §4.2 Phase B — "endpoints with empty tags AND compatible with d",
//!     not "every other endpoint").
//! Both phases preserve the registry's priority-then-declaration order.
//! A blacklisted endpoint is still included (invariant I2) — only
//! `enabled` and dialect compatibility gate membership; the retry
//! controller is responsible for short-circuiting blacklisted attempts.

use crate::dialect::Dialect;
use crate::endpoint::{Endpoint, EndpointRegistry};

#[derive(Debug, Clone, Default)]
pub struct CandidatePools {
	pub tagged: Vec<Endpoint>,
	pub universal: Vec<Endpoint>,
}

impl CandidatePools {
	pub fn is_empty(&self) -> bool {
		self.tagged.is_empty() && self.universal.is_empty()
	}

	pub fn tagged_active(&self) -> usize {
		self.tagged.iter().filter(|e| !e.is_blacklisted()).count()
	}

	pub fn universal_active(&self) -> usize {
		self.universal.iter().filter(|e| !e.is_blacklisted()).count()
	}
}

pub fn select_candidates(registry: &EndpointRegistry, dialect: Dialect, required_tags: &[String]) -> CandidatePools {
	let snapshot = registry.snapshot();
	let candidate = |e: &&Endpoint| e.is_candidate_for(dialect);

	let tagged = if required_tags.is_empty() {
		Vec::new()
	} else {
		snapshot
			.iter()
			.filter(candidate)
			.filter(|e| required_tags.iter().all(|t| e.config.tags.contains(t)))
			.cloned()
			.collect()
	};

	let universal = snapshot
		.iter()
		.filter(candidate)
		.filter(|e| e.config.tags.is_empty())
		.cloned()
		.collect();

	CandidatePools { tagged, universal }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::endpoint::{AuthType, EndpointConfig};

	fn cfg(id: &str, priority: i32, tags: &[&str]) -> EndpointConfig {
		EndpointConfig {
			id: id.into(),
			name: id.into(),
			enabled: true,
			priority,
			url_anthropic: Some("https://api.anthropic.com".into()),
			url_openai: None,
			url_gemini: None,
			endpoint_type: Dialect::Anthropic,
			auth_type: AuthType::ApiKey,
			auth_value: "k".into(),
			oauth_refresh: None,
			tags: tags.iter().map(|s| s.to_string()).collect(),
			model_rewrite: vec![],
			parameter_overrides: Default::default(),
			header_overrides: Default::default(),
			error_pattern_rules: Default::default(),
		}
	}

	#[test]
	fn universal_pool_excludes_tagged_endpoints() {
		let reg = EndpointRegistry::new(vec![cfg("a", 0, &[]), cfg("b", 0, &["fast"])]);
		let pools = select_candidates(&reg, Dialect::Anthropic, &["gpu".to_string()]);
		assert!(pools.tagged.is_empty());
		let ids: Vec<_> = pools.universal.iter().map(|e| e.id().to_string()).collect();
		assert_eq!(ids, vec!["a"]);
	}

	#[test]
	fn prefers_tagged_match_when_present() {
		let reg = EndpointRegistry::new(vec![cfg("a", 0, &[]), cfg("b", 0, &["fast"])]);
		let pools = select_candidates(&reg, Dialect::Anthropic, &["fast".to_string()]);
		let tagged_ids: Vec<_> = pools.tagged.iter().map(|e| e.id().to_string()).collect();
		assert_eq!(tagged_ids, vec!["b"]);
		let universal_ids: Vec<_> = pools.universal.iter().map(|e| e.id().to_string()).collect();
		assert_eq!(universal_ids, vec!["a"]);
	}

	#[test]
	fn blacklisted_endpoints_still_appear_in_the_pool() {
		let reg = EndpointRegistry::new(vec![cfg("a", 1, &[]), cfg("b", 0, &[])]);
		reg.find_by_id("a").unwrap().runtime.mark_inactive("boom", "r1");
		let pools = select_candidates(&reg, Dialect::Anthropic, &[]);
		let ids: Vec<_> = pools.universal.iter().map(|e| e.id().to_string()).collect();
		assert_eq!(ids, vec!["a", "b"], "invariant I2: blacklisted endpoints remain in the candidate list");
		assert_eq!(pools.universal_active(), 1);
	}

	#[test]
	fn no_tags_requested_yields_only_universal_pool() {
		let reg = EndpointRegistry::new(vec![cfg("a", 0, &[]), cfg("b", 0, &["fast"])]);
		let pools = select_candidates(&reg, Dialect::Anthropic, &[]);
		assert!(pools.tagged.is_empty());
		let ids: Vec<_> = pools.universal.iter().map(|e| e.id().to_string()).collect();
		assert_eq!(ids, vec!["a"]);
	}
}
