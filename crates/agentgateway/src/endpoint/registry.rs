//! C2 — Endpoint Registry: an ordered, priority-sorted list of
//! [`super::Endpoint`] loaded once at startup (spec.md §4.2). The registry
//! itself holds no per-endpoint lock; each endpoint locks its own
//! `EndpointRuntime` independently, so concurrent requests touching
//! different endpoints never contend (spec.md §5, invariant I5).

use std::sync::Arc;

use arc_swap::ArcSwap;

use super::{Endpoint, EndpointConfig};
use crate::dialect::Dialect;

pub struct EndpointRegistry {
	endpoints: ArcSwap<Vec<Endpoint>>,
}

impl EndpointRegistry {
	pub fn new(configs: Vec<EndpointConfig>) -> Self {
		let mut endpoints: Vec<Endpoint> = configs.into_iter().map(Endpoint::new).collect();
		endpoints.sort_by(priority_order);
		EndpointRegistry {
			endpoints: ArcSwap::from_pointee(endpoints),
		}
	}

	/// A consistent, point-in-time view for a single request's dispatch
	/// decision (SPEC_FULL.md concurrency supplement): later blacklist/learn
	/// mutations on individual endpoints are still visible through their own
	/// `Arc<EndpointRuntime>`, only the *list membership and order* is
	/// pinned for the duration of the snapshot's lifetime.
	pub fn snapshot(&self) -> Arc<Vec<Endpoint>> {
		self.endpoints.load_full()
	}

	pub fn find_by_id(&self, id: &str) -> Option<Endpoint> {
		self.snapshot().iter().find(|e| e.id() == id).cloned()
	}

	pub fn find_by_name(&self, name: &str) -> Option<Endpoint> {
		self.snapshot().iter().find(|e| e.name() == name).cloned()
	}

	/// All endpoints that could ever serve `dialect`, ignoring current
	/// availability — used for startup validation / diagnostics, not the
	/// hot dispatch path (that's [`super::selector`]).
	pub fn compatible_with(&self, dialect: Dialect) -> Vec<Endpoint> {
		self
			.snapshot()
			.iter()
			.filter(|e| e.config.is_compatible_with_format(dialect))
			.cloned()
			.collect()
	}

	pub fn replace_all(&self, configs: Vec<EndpointConfig>) {
		let mut endpoints: Vec<Endpoint> = configs.into_iter().map(Endpoint::new).collect();
		endpoints.sort_by(priority_order);
		self.endpoints.store(Arc::new(endpoints));
	}

	pub fn len(&self) -> usize {
		self.endpoints.load().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Lower `priority` sorts first (spec.md §3: "priority (lower first)");
/// ties keep declaration order (spec.md §4.3: "declared order is the
/// tie-break").
fn priority_order(a: &Endpoint, b: &Endpoint) -> std::cmp::Ordering {
	a.config.priority.cmp(&b.config.priority)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dialect::Dialect;

	fn cfg(id: &str, priority: i32, openai: bool) -> EndpointConfig {
		EndpointConfig {
			id: id.into(),
			name: id.into(),
			enabled: true,
			priority,
			url_anthropic: None,
			url_openai: if openai {
				Some("https://api.openai.com".into())
			} else {
				None
			},
			url_gemini: None,
			endpoint_type: Dialect::OpenAiChat,
			auth_type: crate::endpoint::AuthType::ApiKey,
			auth_value: "k".into(),
			oauth_refresh: None,
			tags: Default::default(),
			model_rewrite: vec![],
			parameter_overrides: Default::default(),
			header_overrides: Default::default(),
			error_pattern_rules: Default::default(),
		}
	}

	#[test]
	fn sorts_by_priority_then_declaration_order() {
		let reg = EndpointRegistry::new(vec![cfg("low", 1, true), cfg("high", 10, true), cfg(
			"mid", 5, true,
		)]);
		let ids: Vec<_> = reg.snapshot().iter().map(|e| e.id().to_string()).collect();
		assert_eq!(ids, vec!["low", "mid", "high"]);
	}

	#[test]
	fn compatible_with_filters_by_dialect() {
		let reg = EndpointRegistry::new(vec![cfg("a", 0, true), cfg("b", 0, false)]);
		let compat = reg.compatible_with(Dialect::OpenAiChat);
		assert_eq!(compat.len(), 1);
		assert_eq!(compat[0].id(), "a");
	}
}
