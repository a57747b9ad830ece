//! Typed errors for the two strata described in spec.md §7: local errors
//! that never reach the client, and codec errors raised by the format
//! conversion collaborator.

use thiserror::Error;

/// Errors raised while assembling or routing a request, before any
/// upstream I/O happens. The Retry Controller (`retry`) maps every one of
/// these, when it surfaces mid-attempt, to `ErrorKind::ConfigError`.
#[derive(Debug, Error)]
pub enum GatewayError {
	#[error("no endpoint compatible with dialect {0:?}")]
	NoCompatibleEndpoint(crate::dialect::Dialect),

	#[error("endpoint {0} has no URL for any dialect")]
	EndpointUnusable(String),

	#[error("failed to build request body: {0}")]
	BodyBuild(#[source] serde_json::Error),

	#[error("failed to assemble auth header: {0}")]
	AuthAssembly(String),

	#[error("invalid header value for {name}: {source}")]
	InvalidHeader {
		name: &'static str,
		#[source]
		source: http::header::InvalidHeaderValue,
	},

	#[error("invalid config: {0}")]
	Config(String),

	#[error(transparent)]
	Codec(#[from] CodecError),
}

/// Errors raised by the codec collaborator (spec.md §6). Per the spec,
/// "errors are transient only when explicitly tagged" — `Transient`
/// failures are eligible for the same retry/fallback treatment as an
/// upstream error; everything else is a hard config-time failure.
#[derive(Debug, Error)]
pub enum CodecError {
	#[error("malformed {dialect} body: {source}")]
	Malformed {
		dialect: &'static str,
		#[source]
		source: serde_json::Error,
	},

	#[error("unsupported conversion {from} -> {to}")]
	UnsupportedConversion {
		from: &'static str,
		to: &'static str,
	},

	#[error("transient codec failure: {0}")]
	Transient(String),
}

impl CodecError {
	pub fn is_transient(&self) -> bool {
		matches!(self, CodecError::Transient(_))
	}
}
