//! Thin axum transport wrapper (SPEC_FULL.md: "a thin axum wrapper that
//! exists so the crate is exercisable end to end"). Every route does the
//! minimum extraction needed to hand the request to [`dispatch`] and
//! writes back whatever [`dispatch::DispatchResponse`] it gets, verbatim
//! — no routing logic lives here, that's entirely C1/C3/C7's job.
//!
//! Bit-exact requirements (spec.md §6) this layer must not break: the
//! `anthropic-version` request header and `X-Accel-Buffering: no`
//! response header are preserved because this module never strips or
//! rewrites headers, only passes through whatever the codec/executor
//! collaborators already decided.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{OriginalUri, RawQuery, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use http::{HeaderMap, StatusCode};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::dispatch::{self, DispatchResponse};
use crate::endpoint::EndpointRegistry;
use crate::executor::AttemptExecutor;
use crate::health::HealthSink;

/// Everything a request handler needs to reach `dispatch::handle_request`.
/// Cloned per request (every field is already `Arc`-backed or cheap), not
/// locked — the registry and runtime state manage their own concurrency
/// (spec.md §5, invariant I5).
#[derive(Clone)]
pub struct AppState {
	pub registry: Arc<EndpointRegistry>,
	pub executor: Arc<AttemptExecutor>,
	pub health: Arc<dyn HealthSink>,
}

pub fn build_router(state: AppState) -> Router {
	Router::new()
		.route("/v1/messages", post(dispatch_handler))
		.route("/v1/messages/count_tokens", post(dispatch_handler))
		.route("/v1/chat/completions", post(dispatch_handler))
		.route("/responses", post(dispatch_handler))
		.route("/v1beta/models/{*rest}", post(dispatch_handler))
		.route("/v1/models", get(dispatch_handler))
		.route("/v1beta/models", get(dispatch_handler))
		.layer(CorsLayer::permissive())
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

async fn dispatch_handler(
	State(state): State<AppState>,
	OriginalUri(uri): OriginalUri,
	RawQuery(query): RawQuery,
	headers: HeaderMap,
	body: Bytes,
) -> Response {
	let response = dispatch::handle_request(
		&state.registry,
		&state.executor,
		state.health.as_ref(),
		uri.path(),
		query.as_deref().unwrap_or(""),
		&headers,
		body,
	)
	.await;

	to_axum_response(response)
}

fn to_axum_response(response: DispatchResponse) -> Response {
	let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
	let mut builder = Response::builder().status(status);
	if let Some(builder_headers) = builder.headers_mut() {
		*builder_headers = response.headers;
	}
	if response.skip_logging {
		tracing::debug!(status = response.status, "response skips request logging");
	}
	builder
		.body(Body::from(response.body))
		.unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Binds and serves `router` until the process is killed. Kept here
/// rather than in `agentgateway-app` so the binary crate never needs a
/// direct `axum` dependency of its own — the "thin wrapper" lives
/// entirely in this collaborator (SPEC_FULL.md's workspace layout note).
pub async fn serve(router: Router, addr: SocketAddr) -> std::io::Result<()> {
	let listener = tokio::net::TcpListener::bind(addr).await?;
	tracing::info!(%addr, "listening");
	axum::serve(listener, router).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::health::LoggingHealthSink;

	fn empty_state() -> AppState {
		AppState {
			registry: Arc::new(EndpointRegistry::new(vec![])),
			executor: Arc::new(AttemptExecutor::new()),
			health: Arc::new(LoggingHealthSink::new()),
		}
	}

	#[test]
	fn router_builds_without_panicking() {
		let _router = build_router(empty_state());
	}

	#[test]
	fn dispatch_response_maps_status_and_body() {
		let mut headers = HeaderMap::new();
		headers.insert("x-accel-buffering", http::HeaderValue::from_static("no"));
		let response = to_axum_response(DispatchResponse {
			status: 502,
			headers,
			body: Bytes::from_static(b"{}"),
			skip_logging: false,
		});
		assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
		assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");
	}
}
