use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs the process-wide `tracing` subscriber. Honors `RUST_LOG`,
/// defaulting to `info` for our own crates and `warn` for dependencies.
///
/// Call once, from the binary's `main`. Safe to call more than once in
/// tests (`set_global_default` errors are swallowed).
pub fn init_tracing(json: bool) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new("warn,agentgateway=info,agent_core=info"));

	let registry = tracing_subscriber::registry().with(filter);

	let installed = if json {
		registry
			.with(tracing_subscriber::fmt::layer().json().with_target(true))
			.try_init()
	} else {
		registry
			.with(tracing_subscriber::fmt::layer().with_target(true))
			.try_init()
	};

	if let Err(e) = installed {
		tracing::debug!("tracing subscriber already installed: {e}");
	}
}
