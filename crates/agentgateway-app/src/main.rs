//! CLI bootstrap: the out-of-scope "config file persistence format" and
//! "CLI bootstrap" the core deliberately excludes (spec.md §1). Loads the
//! endpoint list, wires the concrete collaborators `agentgateway` ships,
//! installs tracing, and serves HTTP until killed.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use agentgateway::config::{EndpointSource, StaticEndpointSource};
use agentgateway::count_tokens;
use agentgateway::endpoint::EndpointRegistry;
use agentgateway::executor::AttemptExecutor;
use agentgateway::health::{HealthSink, LoggingHealthSink};
use agentgateway::server::{self, AppState};

#[derive(Parser, Debug)]
#[command(name = "agentgateway", about = "LLM dispatch gateway")]
struct Cli {
	/// YAML file listing the endpoints to dispatch across.
	#[arg(long, env = "AGENTGATEWAY_CONFIG", default_value = "config.yaml")]
	config: PathBuf,

	/// Address to bind the HTTP listener to.
	#[arg(long, env = "AGENTGATEWAY_BIND", default_value = "0.0.0.0:8080")]
	bind: SocketAddr,

	/// Emit JSON-formatted logs instead of the human-readable text format.
	#[arg(long, env = "AGENTGATEWAY_JSON_LOGS", default_value_t = false)]
	json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();
	agent_core::telemetry::init_tracing(cli.json_logs);

	// Warms the tiktoken BPE tables outside the request path (see
	// `count_tokens::preload_tokenizers` docs).
	count_tokens::preload_tokenizers();

	let source = StaticEndpointSource::from_yaml_file(&cli.config)
		.with_context(|| format!("loading endpoint config from {}", cli.config.display()))?;
	let endpoints = source.load().context("parsing endpoint config")?;
	tracing::info!(count = endpoints.len(), path = %cli.config.display(), "loaded endpoint config");

	let state = AppState {
		registry: Arc::new(EndpointRegistry::new(endpoints)),
		executor: Arc::new(AttemptExecutor::new()),
		health: Arc::new(LoggingHealthSink::new()) as Arc<dyn HealthSink>,
	};

	let router = server::build_router(state);
	server::serve(router, cli.bind).await.context("serving HTTP")?;
	Ok(())
}
