//! C2 — Endpoint Registry collaborator and the joined config/runtime
//! record it manages.

pub mod config;
pub mod registry;
pub mod runtime;
pub mod selector;

use std::sync::Arc;

pub use config::{AuthType, EndpointConfig, ErrorPatternRule, ModelRewriteRule, OAuthRefreshConfig, RuleAction};
pub use registry::EndpointRegistry;
pub use runtime::{DetectedAuthHeader, EndpointRuntime, LearnedState, OpenAiPreference, TriState};

use crate::dialect::Dialect;

/// An endpoint as seen by the rest of the crate: immutable config joined
/// with its mutable runtime state by `id` (spec.md §9 redesign flag; see
/// [`config`] module docs).
#[derive(Clone)]
pub struct Endpoint {
	pub config: Arc<EndpointConfig>,
	pub runtime: Arc<EndpointRuntime>,
}

impl Endpoint {
	pub fn new(config: EndpointConfig) -> Self {
		Endpoint {
			config: Arc::new(config),
			runtime: Arc::new(EndpointRuntime::new()),
		}
	}

	pub fn id(&self) -> &str {
		&self.config.id
	}

	pub fn name(&self) -> &str {
		&self.config.name
	}

	/// Candidate-list membership (spec.md §4.2/I1): enabled + dialect
	/// compatibility only. Availability is deliberately *not* checked here —
	/// invariant I2 requires a blacklisted endpoint to still appear in the
	/// candidate list so the retry controller's outer loop can count it and
	/// short-circuit it (spec.md §4.7), rather than have it silently vanish
	/// from selection.
	pub fn is_candidate_for(&self, d: Dialect) -> bool {
		self.config.enabled && self.config.is_compatible_with_format(d)
	}

	/// C8: true once `mark_inactive` has been called and no health check has
	/// reinstated the endpoint yet.
	pub fn is_blacklisted(&self) -> bool {
		!self.runtime.is_available()
	}
}

impl std::fmt::Debug for Endpoint {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Endpoint")
			.field("id", &self.config.id)
			.field("name", &self.config.name)
			.field("available", &self.runtime.is_available())
			.finish()
	}
}
