//! Token proxy server for the vehicle-location dashboard.

// std
use std::sync::Arc;
// crates.io
use color_eyre::eyre::Result;
use fleet_token_broker::{
	broker::TokenBroker,
	config::Config,
	fetch::AuthenticatedFetch,
	oauth::PasswordGrantExchanger,
	obs,
	reqwest::Client,
	server::{self, AppState},
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let config = Config::from_env()?;

	obs::init_tracing(config.debug)?;

	let exchanger = PasswordGrantExchanger::new(config.credentials.clone())?;
	let broker = TokenBroker::builder(Arc::new(exchanger))
		.exchange_timeout(config.exchange_timeout)
		.build();
	let mut state = AppState::new(broker.clone());

	if let Some(base_url) = config.api_base_url.clone() {
		let fetch = AuthenticatedFetch::new(broker.clone(), Client::builder().build()?)
			.with_base_url(base_url)
			.with_timeout(config.data_timeout);

		state = state.with_fetch(fetch);
	}

	if let Err(e) = broker.init().await {
		tracing::warn!(error = %e, "initial token exchange failed; retrying on first request");
	}

	let app = server::router(state, config.server.static_dir.as_deref());
	let listener = TcpListener::bind(config.bind_addr()).await?;

	tracing::info!(addr = %listener.local_addr()?, debug = config.debug, "token proxy listening");

	axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
	broker.shutdown();

	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!(error = %e, "failed to listen for the shutdown signal");
	}

	tracing::info!("shutting down");
}
