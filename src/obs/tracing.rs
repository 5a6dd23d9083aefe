// crates.io
use tracing::{Instrument, Span, instrument::Instrumented};
use tracing_subscriber::{
	EnvFilter,
	layer::SubscriberExt,
	util::{SubscriberInitExt, TryInitError},
};
// self
use crate::{_prelude::*, obs::ExchangeTrigger};

/// Span wrapper used by token exchanges.
#[derive(Clone, Debug)]
pub struct ExchangeSpan {
	span: Span,
}
impl ExchangeSpan {
	/// Creates a new span tagged with the provided trigger.
	pub fn new(trigger: ExchangeTrigger) -> Self {
		Self { span: tracing::info_span!("fleet_token_broker.exchange", trigger = trigger.as_str()) }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		fut.instrument(self.span.clone())
	}
}

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `debug` enables verbose output and the default level is
/// `info`.
pub fn init_tracing(debug: bool) -> Result<(), TryInitError> {
	let fallback = if debug { "debug" } else { "info" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_target(false))
		.try_init()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = ExchangeSpan::new(ExchangeTrigger::OnDemand);
		let value = ExchangeSpan::instrument(&span, async { 42 }).await;

		assert_eq!(value, 42);
	}
}
