//! `metrics` counter published when the `metrics` feature is enabled.

// self
use crate::obs::{ExchangeOutcome, ExchangeTrigger};

/// Counter bumped once per exchange attempt, success, and failure.
pub const EXCHANGE_COUNTER: &str = "fleet_token_broker_exchange_total";

/// Bumps [`EXCHANGE_COUNTER`] under the `trigger` and `outcome` labels.
#[cfg(feature = "metrics")]
pub fn record_exchange_outcome(trigger: ExchangeTrigger, outcome: ExchangeOutcome) {
	metrics::counter!(EXCHANGE_COUNTER, "trigger" => trigger.as_str(), "outcome" => outcome.as_str())
		.increment(1);
}

/// No-op without the `metrics` feature.
#[cfg(not(feature = "metrics"))]
pub fn record_exchange_outcome(_: ExchangeTrigger, _: ExchangeOutcome) {}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn every_label_pair_can_be_recorded() {
		for trigger in [ExchangeTrigger::OnDemand, ExchangeTrigger::Proactive] {
			for outcome in
				[ExchangeOutcome::Attempt, ExchangeOutcome::Success, ExchangeOutcome::Failure]
			{
				record_exchange_outcome(trigger, outcome);
			}
		}

		assert!(EXCHANGE_COUNTER.ends_with("_total"));
	}
}
