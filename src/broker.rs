//! Single-slot token broker with single-flight exchanges and proactive renewal.
//!
//! The broker keeps at most one bearer token. Callers that find the slot empty or past its
//! renewal point join the one pending exchange instead of starting their own; the exchange
//! itself runs on a spawned task so a cancelled caller never strands the others. Every
//! successful exchange re-arms a one-shot renewal timer that refreshes the token before it
//! expires. A generation counter lets [`TokenBroker::invalidate`] discard results of an
//! exchange that was already in flight.

mod metrics;
mod renewal;

pub use metrics::ExchangeMetrics;

// crates.io
use tokio::task::JoinError;
// self
use crate::{
	_prelude::*,
	auth::{Token, renewal_delay},
	clock::Clock,
	error::{AuthError, TimedOperation, TimeoutError},
	oauth::TokenExchanger,
	obs::{self, ExchangeOutcome, ExchangeSpan, ExchangeTrigger},
};
use renewal::RenewalTimer;

/// Deadline applied to every token exchange unless overridden.
pub const DEFAULT_EXCHANGE_TIMEOUT: StdDuration = StdDuration::from_secs(15);

/// Where an acquired token came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenSource {
	/// Served from the cache before its renewal point.
	Cache,
	/// Produced by the exchange this call waited on.
	Exchange,
	/// The exchange failed; the still-unexpired cached token was handed out instead.
	Stale,
}

/// Token handed to a caller together with its provenance.
#[derive(Clone, Debug)]
pub struct AcquiredToken {
	/// Token to present upstream.
	pub token: Token,
	/// Where the token came from.
	pub source: TokenSource,
}
impl AcquiredToken {
	/// Returns `true` unless the token came from the exchange this call waited on.
	pub fn is_cached(&self) -> bool {
		!matches!(self.source, TokenSource::Exchange)
	}
}

/// Read-only view of the cache used for health reporting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerSnapshot {
	/// Whether a token currently sits in the cache.
	pub token_cached: bool,
	/// Expiry of the cached token.
	pub expires_at: Option<OffsetDateTime>,
	/// Whether an exchange is in flight.
	pub exchanging: bool,
}

/// Builder for [`TokenBroker`].
pub struct TokenBrokerBuilder {
	exchanger: Arc<dyn TokenExchanger>,
	exchange_timeout: StdDuration,
	clock: Option<Clock>,
}
impl TokenBrokerBuilder {
	/// Overrides the exchange deadline (defaults to [`DEFAULT_EXCHANGE_TIMEOUT`]).
	pub fn exchange_timeout(mut self, timeout: StdDuration) -> Self {
		self.exchange_timeout = timeout;

		self
	}

	/// Overrides the clock used to stamp and age tokens.
	pub fn clock(mut self, clock: Clock) -> Self {
		self.clock = Some(clock);

		self
	}

	/// Builds the broker with an empty cache.
	pub fn build(self) -> TokenBroker {
		let clock = self.clock.unwrap_or_default();
		let inner = Arc::new_cyclic(|me| BrokerInner {
			exchanger: self.exchanger,
			clock,
			exchange_timeout: self.exchange_timeout,
			metrics: ExchangeMetrics::default(),
			slot: Mutex::new(Slot::default()),
			me: me.clone(),
		});

		TokenBroker(inner)
	}
}
impl Debug for TokenBrokerBuilder {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenBrokerBuilder")
			.field("exchange_timeout", &self.exchange_timeout)
			.field("clock", &self.clock)
			.finish()
	}
}

/// Owner of the cached bearer token.
///
/// Cloning is cheap; clones share the same cache, pending exchange, and renewal timer.
#[derive(Clone)]
pub struct TokenBroker(Arc<BrokerInner>);
impl TokenBroker {
	/// Creates a broker with default settings.
	pub fn new(exchanger: Arc<dyn TokenExchanger>) -> Self {
		Self::builder(exchanger).build()
	}

	/// Starts configuring a broker around `exchanger`.
	pub fn builder(exchanger: Arc<dyn TokenExchanger>) -> TokenBrokerBuilder {
		TokenBrokerBuilder { exchanger, exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT, clock: None }
	}

	/// Returns a token that is safe to present upstream.
	pub async fn get_valid_token(&self) -> Result<Token> {
		self.acquire().await.map(|acquired| acquired.token)
	}

	/// Returns a usable token and reports where it came from.
	///
	/// A cached token is returned as-is before its renewal point. Otherwise the caller joins
	/// the pending exchange, starting one if none is in flight. If that exchange fails while
	/// the cached token is still unexpired, the cached token is returned as
	/// [`TokenSource::Stale`].
	pub async fn acquire(&self) -> Result<AcquiredToken> {
		let inner = &self.0;

		loop {
			let (pending, generation) = {
				let mut slot = inner.slot.lock();

				if slot.closed {
					return Err(AuthError::Closed.into());
				}
				if let Some(token) =
					slot.token.as_ref().filter(|token| !token.needs_refresh_at(inner.clock.now()))
				{
					inner.metrics.record_cache_hit();

					return Ok(AcquiredToken { token: token.clone(), source: TokenSource::Cache });
				}

				(inner.begin_exchange(&mut slot, ExchangeTrigger::OnDemand), slot.generation)
			};
			let outcome = pending.outcome.wait().await.clone();

			// Joined an exchange that an invalidation already superseded; start over.
			if pending.generation != generation {
				continue;
			}

			return match outcome {
				Ok(token) => Ok(AcquiredToken { token, source: TokenSource::Exchange }),
				Err(e) => inner.stale_fallback(e),
			};
		}
	}

	/// Warms the cache at startup.
	pub async fn init(&self) -> Result<()> {
		self.acquire().await.map(|_| ())
	}

	/// Clears the cached token and cancels the scheduled renewal.
	///
	/// An exchange already in flight still completes, but its result is dropped and its
	/// waiters receive [`AuthError::Invalidated`].
	pub fn invalidate(&self) {
		let mut slot = self.0.slot.lock();

		slot.reset();

		tracing::info!("token cache invalidated");
	}

	/// Invalidates the cache and refuses all further acquisitions.
	pub fn shutdown(&self) {
		let mut slot = self.0.slot.lock();

		slot.reset();
		slot.closed = true;

		tracing::info!("token broker shut down");
	}

	/// Read-only view of the cache.
	pub fn snapshot(&self) -> BrokerSnapshot {
		let slot = self.0.slot.lock();

		BrokerSnapshot {
			token_cached: slot.token.is_some(),
			expires_at: slot.token.as_ref().map(|token| token.expires_at),
			exchanging: slot.pending.is_some(),
		}
	}

	/// Cached token, regardless of its status.
	pub fn current(&self) -> Option<Token> {
		self.0.slot.lock().token.clone()
	}

	/// Exchange counters.
	pub fn metrics(&self) -> &ExchangeMetrics {
		&self.0.metrics
	}

	/// Current instant according to the broker's clock.
	pub fn now(&self) -> OffsetDateTime {
		self.0.clock.now()
	}
}
impl Debug for TokenBroker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenBroker")
			.field("exchange_timeout", &self.0.exchange_timeout)
			.field("snapshot", &self.snapshot())
			.finish()
	}
}

struct PendingExchange {
	generation: u64,
	outcome: AsyncOnceCell<Result<Token>>,
}

#[derive(Default)]
struct Slot {
	token: Option<Token>,
	generation: u64,
	pending: Option<Arc<PendingExchange>>,
	renewal: Option<RenewalTimer>,
	renewal_ticket: u64,
	closed: bool,
}
impl Slot {
	fn reset(&mut self) {
		self.token = None;
		self.generation += 1;

		if let Some(timer) = self.renewal.take() {
			timer.cancel();
		}
	}
}

struct BrokerInner {
	exchanger: Arc<dyn TokenExchanger>,
	clock: Clock,
	exchange_timeout: StdDuration,
	metrics: ExchangeMetrics,
	slot: Mutex<Slot>,
	me: Weak<BrokerInner>,
}
impl BrokerInner {
	/// Returns the pending exchange, spawning one if none is in flight.
	fn begin_exchange(&self, slot: &mut Slot, trigger: ExchangeTrigger) -> Arc<PendingExchange> {
		if let Some(pending) = &slot.pending {
			return Arc::clone(pending);
		}

		let pending = Arc::new(PendingExchange {
			generation: slot.generation,
			outcome: AsyncOnceCell::new(),
		});
		let task = Arc::clone(&pending);
		let me = self.me.clone();

		slot.pending = Some(Arc::clone(&pending));

		tokio::spawn(async move {
			let Some(inner) = me.upgrade() else {
				let _ = task.outcome.set(Err(AuthError::Closed.into())).await;

				return;
			};
			// A panic inside the exchange comes back as a `JoinError`.
			let run = tokio::spawn({
				let inner = Arc::clone(&inner);
				let task = Arc::clone(&task);

				async move { inner.run_exchange(trigger, &task).await }
			});
			let outcome = match run.await {
				Ok(outcome) => outcome,
				Err(e) => inner.abort_exchange(trigger, &task, e),
			};
			let _ = task.outcome.set(outcome).await;
		});

		pending
	}

	async fn run_exchange(
		&self,
		trigger: ExchangeTrigger,
		pending: &Arc<PendingExchange>,
	) -> Result<Token> {
		let span = ExchangeSpan::new(trigger);

		obs::record_exchange_outcome(trigger, ExchangeOutcome::Attempt);
		self.metrics.record_attempt();

		let result = span
			.instrument(async {
				let exchange = tokio::time::timeout(self.exchange_timeout, self.exchanger.exchange());
				let grant = match exchange.await {
					Ok(grant) => grant.map_err(Error::from),
					Err(_) => {
						tracing::warn!(
							timeout_ms = self.exchange_timeout.as_millis() as u64,
							"timeout: token exchange exceeded its deadline"
						);

						Err(TimeoutError::new(TimedOperation::Exchange, self.exchange_timeout).into())
					},
				};
				let token = grant.and_then(|grant| {
					let lifetime = grant.expires_in;

					Token::new(grant.access_token, self.clock.now(), lifetime).ok_or_else(|| {
						AuthError::MalformedResponse {
							status: None,
							reason: format!(
								"a lifetime of {}s puts the expiry out of range",
								lifetime.whole_seconds()
							),
						}
						.into()
					})
				});
				let result = self.apply(pending, token);

				match &result {
					Ok(token) => tracing::info!(
						expires_at = %token.expires_at,
						refresh_at = %token.refresh_at,
						"token exchange succeeded"
					),
					Err(e) => tracing::warn!(error = %e, "token exchange failed"),
				}

				result
			})
			.await;

		match &result {
			Ok(_) => {
				self.metrics.record_success();
				obs::record_exchange_outcome(trigger, ExchangeOutcome::Success);
			},
			Err(_) => {
				self.metrics.record_failure();
				obs::record_exchange_outcome(trigger, ExchangeOutcome::Failure);
			},
		}

		result
	}

	/// Settles an exchange whose task died before producing an outcome.
	fn abort_exchange(
		&self,
		trigger: ExchangeTrigger,
		pending: &Arc<PendingExchange>,
		e: JoinError,
	) -> Result<Token> {
		let reason = if e.is_panic() { "exchange task panicked" } else { "exchange task was cancelled" };

		tracing::error!(reason, "token exchange aborted");
		self.metrics.record_failure();
		obs::record_exchange_outcome(trigger, ExchangeOutcome::Failure);

		self.apply(pending, Err(AuthError::Aborted { reason: reason.into() }.into()))
	}

	/// Installs an exchange outcome unless the cache moved on while it was in flight.
	fn apply(&self, pending: &Arc<PendingExchange>, outcome: Result<Token>) -> Result<Token> {
		let mut slot = self.slot.lock();

		if slot.pending.as_ref().is_some_and(|current| Arc::ptr_eq(current, pending)) {
			slot.pending = None;
		}
		if slot.closed {
			return Err(AuthError::Closed.into());
		}
		if slot.generation != pending.generation {
			return Err(AuthError::Invalidated.into());
		}

		let token = outcome?;

		slot.token = Some(token.clone());
		self.schedule_renewal(&mut slot, token.lifetime());

		Ok(token)
	}

	fn schedule_renewal(&self, slot: &mut Slot, lifetime: Duration) {
		if let Some(timer) = slot.renewal.take() {
			timer.cancel();
		}

		slot.renewal_ticket += 1;

		let delay = renewal_delay(lifetime).unsigned_abs();

		tracing::debug!(delay_secs = delay.as_secs(), "proactive renewal scheduled");

		slot.renewal = Some(RenewalTimer::arm(self.me.clone(), slot.renewal_ticket, delay));
	}

	/// Proactive renewal fired by the timer identified by `ticket`.
	async fn renew(&self, ticket: u64) {
		let pending = {
			let mut slot = self.slot.lock();

			// Release our own handle so the next schedule does not abort this task.
			if slot.renewal.as_ref().is_none_or(|timer| timer.ticket != ticket) {
				return;
			}

			slot.renewal = None;

			if slot.closed {
				return;
			}

			self.begin_exchange(&mut slot, ExchangeTrigger::Proactive)
		};

		if let Err(e) = pending.outcome.wait().await {
			tracing::warn!(error = %e, "proactive renewal failed; keeping the current token");
		}
	}

	fn stale_fallback(&self, error: Error) -> Result<AcquiredToken> {
		let now = self.clock.now();
		let slot = self.slot.lock();

		match slot.token.as_ref().filter(|token| !token.is_expired_at(now)) {
			Some(token) => {
				tracing::warn!(
					error = %error,
					expires_at = %token.expires_at,
					"token exchange failed; serving the still-valid cached token"
				);

				Ok(AcquiredToken { token: token.clone(), source: TokenSource::Stale })
			},
			None => Err(error),
		}
	}
}
impl Drop for BrokerInner {
	fn drop(&mut self) {
		if let Some(timer) = self.slot.get_mut().renewal.take() {
			timer.cancel();
		}
	}
}
