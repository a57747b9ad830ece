//! Mutable per-endpoint state: learned fields (C9), blacklist lifecycle
//! (C8), and lightweight stats. Guarded by a single `parking_lot::RwLock`
//! per endpoint (spec.md §5, invariant I5: "writes to learned state are
//! serialized per endpoint").

use std::collections::{HashSet, VecDeque};
use std::time::SystemTime;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::blacklist::BlacklistReason;

/// `native_codex_format` tri-state (spec.md §3, invariant I4: transitions
/// `unknown -> yes|no` at most once per process).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
	#[default]
	Unknown,
	Yes,
	No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OpenAiPreference {
	#[default]
	Auto,
	Responses,
	ChatCompletions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectedAuthHeader {
	Authorization,
	ApiKey,
}

/// Bound on `causing_request_ids` (spec.md §3 Blacklist Reason, "bounded").
pub const MAX_CAUSING_REQUEST_IDS: usize = 32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearnedState {
	pub detected_auth_header: Option<DetectedAuthHeader>,
	pub native_codex_format: TriState,
	pub openai_preference: OpenAiPreference,
	pub learned_unsupported_params: HashSet<String>,
	pub count_tokens_enabled: bool,
}

impl LearnedState {
	pub fn fresh() -> Self {
		LearnedState {
			count_tokens_enabled: true,
			..Default::default()
		}
	}
}

#[derive(Debug, Default)]
pub struct Stats {
	pub requests_total: u64,
	pub requests_failed: u64,
}

pub struct EndpointRuntime {
	state: RwLock<Inner>,
}

struct Inner {
	learned: LearnedState,
	available: bool,
	blacklist_reason: Option<BlacklistReason>,
	rate_limit_reset: Option<String>,
	rate_limit_status: Option<String>,
	stats: Stats,
	/// Set once a learned field changes; a persistence collaborator
	/// (`health::HealthSink::persist_learned_state`) clears it after flush.
	dirty: bool,
}

impl EndpointRuntime {
	pub fn new() -> Self {
		EndpointRuntime {
			state: RwLock::new(Inner {
				learned: LearnedState::fresh(),
				available: true,
				blacklist_reason: None,
				rate_limit_reset: None,
				rate_limit_status: None,
				stats: Stats::default(),
				dirty: false,
			}),
		}
	}

	pub fn is_available(&self) -> bool {
		self.state.read().available
	}

	pub fn blacklist_reason(&self) -> Option<BlacklistReason> {
		self.state.read().blacklist_reason.clone()
	}

	pub fn learned_snapshot(&self) -> LearnedState {
		self.state.read().learned.clone()
	}

	pub fn is_dirty(&self) -> bool {
		self.state.read().dirty
	}

	pub fn clear_dirty(&self) {
		self.state.write().dirty = false;
	}

	/// C8: mark unavailable with a reason, appending `request_id` to the
	/// bounded causing-request FIFO.
	pub fn mark_inactive(&self, summary: impl Into<String>, request_id: impl Into<String>) {
		let mut guard = self.state.write();
		let reason = guard
			.blacklist_reason
			.get_or_insert_with(|| BlacklistReason::new(summary.into()));
		reason.push_causing_request(request_id.into());
		guard.available = false;
	}

	/// C8: reinstated only by an external health checker (spec.md §4.7).
	pub fn mark_active(&self) {
		let mut guard = self.state.write();
		guard.available = true;
		guard.blacklist_reason = None;
	}

	pub fn record_request(&self, success: bool) {
		let mut guard = self.state.write();
		guard.stats.requests_total += 1;
		if !success {
			guard.stats.requests_failed += 1;
		}
	}

	pub fn set_rate_limit(&self, reset: Option<String>, status: Option<String>) {
		let mut guard = self.state.write();
		guard.rate_limit_reset = reset;
		guard.rate_limit_status = status;
	}

	/// C9: latch the auth header that worked, once. No-op if already set —
	/// mirrors "first successful 2xx on auth_type=auto latches" (spec.md
	/// §4.8): subsequent calls must not flip it back and forth.
	pub fn latch_detected_auth_header(&self, header: DetectedAuthHeader) {
		let mut guard = self.state.write();
		if guard.learned.detected_auth_header.is_none() {
			guard.learned.detected_auth_header = Some(header);
			guard.dirty = true;
		}
	}

	pub fn force_detected_auth_header(&self, header: DetectedAuthHeader) {
		let mut guard = self.state.write();
		guard.learned.detected_auth_header = Some(header);
		guard.dirty = true;
	}

	/// C9 / invariant I4: `native_codex_format` transitions once.
	pub fn latch_native_codex_format(&self, value: TriState) -> bool {
		let mut guard = self.state.write();
		if guard.learned.native_codex_format == TriState::Unknown {
			guard.learned.native_codex_format = value;
			if value == TriState::No {
				guard.learned.openai_preference = OpenAiPreference::ChatCompletions;
			} else if value == TriState::Yes
				&& guard.learned.openai_preference == OpenAiPreference::Auto
			{
				guard.learned.openai_preference = OpenAiPreference::Responses;
			}
			guard.dirty = true;
			true
		} else {
			false
		}
	}

	/// C9 / invariant I3: monotonically growing; returns the names that
	/// were newly added (empty if none were new).
	pub fn add_unsupported_params(&self, names: impl IntoIterator<Item = String>) -> Vec<String> {
		let mut guard = self.state.write();
		let mut added = Vec::new();
		for name in names {
			if guard.learned.learned_unsupported_params.insert(name.clone()) {
				added.push(name);
			}
		}
		if !added.is_empty() {
			guard.dirty = true;
		}
		added
	}

	pub fn set_count_tokens_enabled(&self, enabled: bool) {
		let mut guard = self.state.write();
		if guard.learned.count_tokens_enabled != enabled {
			guard.learned.count_tokens_enabled = enabled;
			guard.dirty = true;
		}
	}
}

impl Default for EndpointRuntime {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for EndpointRuntime {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let guard = self.state.read();
		f.debug_struct("EndpointRuntime")
			.field("learned", &guard.learned)
			.field("available", &guard.available)
			.finish()
	}
}

/// Helper used by blacklist bound enforcement; kept here since it operates
/// purely on the FIFO shape and has no lock dependency.
pub fn bound_fifo(deque: &mut VecDeque<String>) {
	while deque.len() > MAX_CAUSING_REQUEST_IDS {
		deque.pop_front();
	}
}

pub fn now() -> SystemTime {
	SystemTime::now()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn native_codex_format_latches_once() {
		let rt = EndpointRuntime::new();
		assert!(rt.latch_native_codex_format(TriState::No));
		assert!(!rt.latch_native_codex_format(TriState::Yes));
		assert_eq!(rt.learned_snapshot().native_codex_format, TriState::No);
		assert_eq!(
			rt.learned_snapshot().openai_preference,
			OpenAiPreference::ChatCompletions
		);
	}

	#[test]
	fn unsupported_params_are_monotonic() {
		let rt = EndpointRuntime::new();
		let added = rt.add_unsupported_params(["tools".to_string()]);
		assert_eq!(added, vec!["tools".to_string()]);
		let added_again = rt.add_unsupported_params(["tools".to_string(), "tool_choice".to_string()]);
		assert_eq!(added_again, vec!["tool_choice".to_string()]);
		assert_eq!(rt.learned_snapshot().learned_unsupported_params.len(), 2);
	}

	#[test]
	fn blacklist_marks_unavailable_and_reinstates() {
		let rt = EndpointRuntime::new();
		assert!(rt.is_available());
		rt.mark_inactive("502 from upstream", "req-1");
		assert!(!rt.is_available());
		assert_eq!(rt.blacklist_reason().unwrap().causing_request_ids.len(), 1);
		rt.mark_active();
		assert!(rt.is_available());
		assert!(rt.blacklist_reason().is_none());
	}
}
