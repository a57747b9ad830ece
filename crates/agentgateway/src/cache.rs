//! C10 — Per-Request Cache. Memoizes work that would otherwise repeat
//! identically across retry attempts within the same inbound request:
//! body conversions keyed by `(operation, content hash)`, and model
//! rewrites keyed by endpoint name (spec.md §4.9). Scoped to a single
//! request; dropped with the `RequestContext` once the response is sent.

use std::collections::HashMap;

use bytes::Bytes;
use md5::{Digest, Md5};

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct ConversionKey {
	operation: &'static str,
	content_hash: [u8; 16],
}

fn hash_body(body: &[u8]) -> [u8; 16] {
	let mut hasher = Md5::new();
	hasher.update(body);
	hasher.finalize().into()
}

#[derive(Debug, Clone)]
pub struct RewrittenModel {
	pub original_model: String,
	pub rewritten_model: String,
	pub body: Bytes,
}

#[derive(Default)]
pub struct RequestCache {
	conversions: HashMap<ConversionKey, Bytes>,
	model_rewrites: HashMap<String, RewrittenModel>,
}

impl RequestCache {
	pub fn new() -> Self {
		Self::default()
	}

	/// Returns a previously memoized conversion result for `operation`
	/// applied to `body`, if this exact `(operation, body)` pair has been
	/// converted before in this request.
	pub fn get_conversion(&self, operation: &'static str, body: &[u8]) -> Option<Bytes> {
		let key = ConversionKey {
			operation,
			content_hash: hash_body(body),
		};
		self.conversions.get(&key).cloned()
	}

	pub fn put_conversion(&mut self, operation: &'static str, body: &[u8], result: Bytes) {
		let key = ConversionKey {
			operation,
			content_hash: hash_body(body),
		};
		self.conversions.insert(key, result);
	}

	pub fn get_model_rewrite(&self, endpoint_name: &str) -> Option<&RewrittenModel> {
		self.model_rewrites.get(endpoint_name)
	}

	pub fn put_model_rewrite(&mut self, endpoint_name: &str, rewrite: RewrittenModel) {
		self.model_rewrites.insert(endpoint_name.to_string(), rewrite);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn conversion_cache_roundtrips_on_identical_body() {
		let mut cache = RequestCache::new();
		let body = b"{\"model\":\"gpt-5\"}";
		assert!(cache.get_conversion("anthropic_to_openai", body).is_none());
		cache.put_conversion("anthropic_to_openai", body, Bytes::from_static(b"converted"));
		assert_eq!(
			cache.get_conversion("anthropic_to_openai", body).unwrap(),
			Bytes::from_static(b"converted")
		);
	}

	#[test]
	fn model_rewrite_cache_is_keyed_by_endpoint() {
		let mut cache = RequestCache::new();
		cache.put_model_rewrite("ep-a", RewrittenModel {
			original_model: "claude-3-opus".into(),
			rewritten_model: "gpt-5".into(),
			body: Bytes::from_static(b"body"),
		});
		assert!(cache.get_model_rewrite("ep-a").is_some());
		assert!(cache.get_model_rewrite("ep-b").is_none());
	}
}
