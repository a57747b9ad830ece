//! Health / learning persistence collaborator (spec.md §6): an interface
//! the core consumes, not implements — `MarkInactive`, `MarkActive`,
//! `ObserveRequest`, `PersistLearnedState`. SPEC_FULL.md ships one minimal
//! implementation, [`LoggingHealthSink`], so the dispatch engine has
//! something to call through without building the external health-check
//! scheduler spec.md §1 places out of scope.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::endpoint::Endpoint;

/// The collaborator boundary every blacklist/learning mutation flows
/// through. `dispatch` and `retry` hold a `dyn HealthSink` rather than
/// reaching into `EndpointRuntime` directly, so an operator can swap in a
/// real health-check scheduler without touching the core.
pub trait HealthSink: Send + Sync {
	fn mark_inactive(&self, endpoint: &Endpoint, reason: &str, request_id: &str);
	fn mark_active(&self, endpoint: &Endpoint);
	fn observe_request(&self, endpoint: &Endpoint, success: bool, first_byte_ms: Option<u128>, total_ms: u128);
	fn persist_learned_state(&self, endpoint: &Endpoint);
}

/// Emits `tracing` events for every collaborator call and keeps a running
/// process-wide request counter; does not write learned state anywhere
/// durable. Sufficient to exercise every call site (spec.md §7: "all
/// classifications also decide whether to update health statistics").
#[derive(Default)]
pub struct LoggingHealthSink {
	requests_observed: AtomicU64,
}

impl LoggingHealthSink {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn requests_observed(&self) -> u64 {
		self.requests_observed.load(Ordering::Relaxed)
	}
}

impl HealthSink for LoggingHealthSink {
	fn mark_inactive(&self, endpoint: &Endpoint, reason: &str, request_id: &str) {
		endpoint.runtime.mark_inactive(reason.to_string(), request_id.to_string());
		tracing::info!(endpoint = endpoint.name(), reason, request_id, "endpoint marked inactive");
	}

	fn mark_active(&self, endpoint: &Endpoint) {
		endpoint.runtime.mark_active();
		tracing::info!(endpoint = endpoint.name(), "endpoint reinstated");
	}

	fn observe_request(&self, endpoint: &Endpoint, success: bool, first_byte_ms: Option<u128>, total_ms: u128) {
		self.requests_observed.fetch_add(1, Ordering::Relaxed);
		endpoint.runtime.record_request(success);
		tracing::debug!(
			endpoint = endpoint.name(),
			success,
			first_byte_ms,
			total_ms,
			"request observed"
		);
	}

	fn persist_learned_state(&self, endpoint: &Endpoint) {
		if !endpoint.runtime.is_dirty() {
			return;
		}
		let snapshot = endpoint.runtime.learned_snapshot();
		tracing::info!(endpoint = endpoint.name(), learned = ?snapshot, "persisting learned state");
		endpoint.runtime.clear_dirty();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::dialect::Dialect;
	use crate::endpoint::{AuthType, EndpointConfig};

	fn endpoint() -> Endpoint {
		Endpoint::new(EndpointConfig {
			id: "e1".into(),
			name: "e1".into(),
			enabled: true,
			priority: 0,
			url_anthropic: Some("https://api.anthropic.com".into()),
			url_openai: None,
			url_gemini: None,
			endpoint_type: Dialect::Anthropic,
			auth_type: AuthType::ApiKey,
			auth_value: "k".into(),
			oauth_refresh: None,
			tags: Default::default(),
			model_rewrite: vec![],
			parameter_overrides: Default::default(),
			header_overrides: Default::default(),
			error_pattern_rules: Default::default(),
		})
	}

	#[test]
	fn mark_inactive_then_active_round_trips_availability() {
		let sink = LoggingHealthSink::new();
		let ep = endpoint();
		sink.mark_inactive(&ep, "502 from upstream", "req-1");
		assert!(!ep.runtime.is_available());
		sink.mark_active(&ep);
		assert!(ep.runtime.is_available());
	}

	#[test]
	fn persist_clears_dirty_flag() {
		let sink = LoggingHealthSink::new();
		let ep = endpoint();
		ep.runtime
			.add_unsupported_params(["tool_choice".to_string()]);
		assert!(ep.runtime.is_dirty());
		sink.persist_learned_state(&ep);
		assert!(!ep.runtime.is_dirty());
	}

	#[test]
	fn observe_request_increments_counter_and_stats() {
		let sink = LoggingHealthSink::new();
		let ep = endpoint();
		sink.observe_request(&ep, true, Some(120), 340);
		sink.observe_request(&ep, false, None, 500);
		assert_eq!(sink.requests_observed(), 2);
	}
}
