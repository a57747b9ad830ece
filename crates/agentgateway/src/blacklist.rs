//! C8 — Blacklist Manager. An endpoint's blacklist state is just data
//! (`BlacklistReason`) owned by its [`crate::endpoint::runtime::EndpointRuntime`];
//! this module owns the reason type plus the synthetic-log-entry helper
//! used when a blacklisted endpoint is skipped or (defensively) attempted
//! anyway (spec.md §4.7).

use std::collections::VecDeque;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::endpoint::runtime::MAX_CAUSING_REQUEST_IDS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistReason {
	#[serde(with = "time_serde")]
	pub timestamp: SystemTime,
	pub summary: String,
	pub causing_request_ids: VecDeque<String>,
}

impl BlacklistReason {
	pub fn new(summary: String) -> Self {
		BlacklistReason {
			timestamp: SystemTime::now(),
			summary,
			causing_request_ids: VecDeque::new(),
		}
	}

	pub fn push_causing_request(&mut self, request_id: String) {
		self.causing_request_ids.push_back(request_id);
		while self.causing_request_ids.len() > MAX_CAUSING_REQUEST_IDS {
			self.causing_request_ids.pop_front();
		}
	}
}

/// Emitted (via `tracing`, not actually dispatched) when a request arrives
/// for an endpoint that is currently blacklisted — spec.md §4.7: "attempts
/// against a blacklisted endpoint are refused locally with a synthetic 503
/// and logged as such, never forwarded upstream."
pub fn log_synthetic_refusal(endpoint_name: &str, reason: &BlacklistReason, request_id: &str) {
	tracing::warn!(
		endpoint = endpoint_name,
		request_id,
		reason = %reason.summary,
		"refusing request: endpoint is blacklisted"
	);
}

mod time_serde {
	use std::time::{SystemTime, UNIX_EPOCH};

	use serde::{Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(t: &SystemTime, s: S) -> Result<S::Ok, S::Error> {
		let secs = t
			.duration_since(UNIX_EPOCH)
			.map_err(serde::ser::Error::custom)?
			.as_secs_f64();
		s.serialize_f64(secs)
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<SystemTime, D::Error> {
		let secs = f64::deserialize(d)?;
		Ok(UNIX_EPOCH + std::time::Duration::from_secs_f64(secs))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn causing_request_ids_are_bounded() {
		let mut reason = BlacklistReason::new("boom".into());
		for i in 0..(MAX_CAUSING_REQUEST_IDS + 10) {
			reason.push_causing_request(format!("req-{i}"));
		}
		assert_eq!(reason.causing_request_ids.len(), MAX_CAUSING_REQUEST_IDS);
		assert_eq!(reason.causing_request_ids.front().unwrap(), "req-10");
	}
}
