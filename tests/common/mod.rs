#![allow(dead_code)]

// std
use std::{collections::VecDeque, sync::Arc, time::Duration as StdDuration};
// crates.io
use parking_lot::Mutex;
use time::Duration;
use tokio::{sync::Notify, time::Instant};
// self
use fleet_token_broker::{
	broker::TokenBroker,
	error::AuthError,
	oauth::{ExchangeFuture, TokenExchanger, TokenGrant},
};

/// One scripted answer from the token endpoint.
#[derive(Clone)]
pub enum Step {
	Grant(&'static str, i64),
	Fail(AuthError),
	Hang,
	Gated(Arc<Notify>, &'static str, i64),
	Panic,
}

/// [`TokenExchanger`] double that replays a script and records when it was called.
pub struct ScriptedExchanger {
	steps: Mutex<VecDeque<Step>>,
	fallback: Option<Step>,
	delay: Option<StdDuration>,
	calls: Mutex<Vec<Instant>>,
}
impl ScriptedExchanger {
	pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
		Self {
			steps: Mutex::new(steps.into_iter().collect()),
			fallback: None,
			delay: None,
			calls: Mutex::new(Vec::new()),
		}
	}

	/// Exchanger that must never be called.
	pub fn idle() -> Self {
		Self {
			steps: Mutex::new(VecDeque::new()),
			fallback: None,
			delay: None,
			calls: Mutex::new(Vec::new()),
		}
	}

	/// Answer replayed once the script runs out.
	pub fn with_fallback(mut self, step: Step) -> Self {
		self.fallback = Some(step);

		self
	}

	/// Latency added to every exchange.
	pub fn with_delay(mut self, delay: StdDuration) -> Self {
		self.delay = Some(delay);

		self
	}

	pub fn calls(&self) -> usize {
		self.calls.lock().len()
	}

	pub fn call_times(&self) -> Vec<Instant> {
		self.calls.lock().clone()
	}

	/// Next scripted answer; an exhausted script fails the exchange instead of panicking.
	fn next_step(&self) -> Step {
		self.steps.lock().pop_front().or_else(|| self.fallback.clone()).unwrap_or_else(|| {
			Step::Fail(AuthError::Client { message: "exchange script ran out of steps".into() })
		})
	}
}
impl TokenExchanger for ScriptedExchanger {
	fn exchange(&self) -> ExchangeFuture<'_> {
		self.calls.lock().push(Instant::now());

		let step = self.next_step();
		let delay = self.delay;

		Box::pin(async move {
			if let Some(delay) = delay {
				tokio::time::sleep(delay).await;
			}

			match step {
				Step::Grant(value, secs) => Ok(TokenGrant::new(value, Duration::seconds(secs))),
				Step::Fail(err) => Err(err),
				Step::Hang => std::future::pending().await,
				Step::Gated(gate, value, secs) => {
					gate.notified().await;

					Ok(TokenGrant::new(value, Duration::seconds(secs)))
				},
				Step::Panic => panic!("scripted exchanger blew up"),
			}
		})
	}
}

pub fn broker(exchanger: &Arc<ScriptedExchanger>) -> TokenBroker {
	TokenBroker::new(exchanger.clone())
}

pub fn rejected(status: u16) -> AuthError {
	AuthError::Rejected { status, detail: format!("{{\"error\":\"status_{status}\"}}") }
}
