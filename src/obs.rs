//! Observability helpers for token exchanges.
//!
//! Every exchange runs inside a `fleet_token_broker.exchange` span carrying the `trigger`
//! field. Enable the `metrics` feature to increment the `fleet_token_broker_exchange_total`
//! counter for every attempt/success/failure, labeled by `trigger` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// What started an exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExchangeTrigger {
	/// A caller found the cache empty or past its renewal point.
	OnDemand,
	/// The renewal timer fired.
	Proactive,
}
impl ExchangeTrigger {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ExchangeTrigger::OnDemand => "on_demand",
			ExchangeTrigger::Proactive => "proactive",
		}
	}
}
impl Display for ExchangeTrigger {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExchangeOutcome {
	/// Exchange started.
	Attempt,
	/// A token was granted.
	Success,
	/// The exchange failed or timed out.
	Failure,
}
impl ExchangeOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ExchangeOutcome::Attempt => "attempt",
			ExchangeOutcome::Success => "success",
			ExchangeOutcome::Failure => "failure",
		}
	}
}
impl Display for ExchangeOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
