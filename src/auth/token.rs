//! Cached bearer token record and lifecycle helpers.

// self
use crate::{_prelude::*, auth::Secret};

/// Safety buffer subtracted from a token's expiry before it is renewed.
pub const RENEWAL_MARGIN: Duration = Duration::seconds(300);
/// Shortest delay before a proactive renewal fires.
pub const MIN_RENEWAL_DELAY: Duration = Duration::seconds(60);
/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_LIFETIME: Duration = Duration::seconds(3600);

/// Lifecycle status for a cached token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Before `refresh_at`; served from the cache as-is.
	Fresh,
	/// Past `refresh_at` but before `expires_at`; still usable while a renewal runs.
	Stale,
	/// At or past `expires_at`.
	Expired,
}

/// Bearer token held in the broker's single cache slot.
///
/// Tokens are immutable; a renewal produces a new record that replaces the old one.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
	/// Opaque bearer value; callers must avoid logging it.
	pub value: Secret,
	/// Acquisition instant.
	pub issued_at: OffsetDateTime,
	/// `issued_at` plus the upstream-supplied lifetime.
	pub expires_at: OffsetDateTime,
	/// Instant from which the broker renews before handing the token out.
	pub refresh_at: OffsetDateTime,
}
impl Token {
	/// Creates a token issued at `issued_at` that lives for `lifetime`.
	///
	/// Returns `None` when the expiry falls outside the representable date range.
	pub fn new(
		value: impl Into<Secret>,
		issued_at: OffsetDateTime,
		lifetime: Duration,
	) -> Option<Self> {
		let expires_at = issued_at.checked_add(lifetime)?;
		let refresh_at = issued_at.checked_add(renewal_delay(lifetime))?;

		Some(Self { value: value.into(), issued_at, expires_at, refresh_at })
	}

	/// Lifetime granted by the token endpoint.
	pub fn lifetime(&self) -> Duration {
		self.expires_at - self.issued_at
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, now: OffsetDateTime) -> TokenStatus {
		if now >= self.expires_at {
			TokenStatus::Expired
		} else if now >= self.refresh_at {
			TokenStatus::Stale
		} else {
			TokenStatus::Fresh
		}
	}

	/// Returns `true` once the renewal point has been reached.
	pub fn needs_refresh_at(&self, now: OffsetDateTime) -> bool {
		!matches!(self.status_at(now), TokenStatus::Fresh)
	}

	/// Returns `true` if the token can no longer be presented upstream.
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		matches!(self.status_at(now), TokenStatus::Expired)
	}

	/// Time left before expiry, clamped at zero.
	pub fn remaining_at(&self, now: OffsetDateTime) -> Duration {
		(self.expires_at - now).max(Duration::ZERO)
	}
}
impl Debug for Token {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Token")
			.field("value", &"<redacted>")
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.field("refresh_at", &self.refresh_at)
			.finish()
	}
}

/// Delay between acquiring a token and renewing it.
///
/// `max(lifetime - RENEWAL_MARGIN, MIN_RENEWAL_DELAY)`, never past the expiry itself.
pub fn renewal_delay(lifetime: Duration) -> Duration {
	(lifetime - RENEWAL_MARGIN).max(MIN_RENEWAL_DELAY).min(lifetime)
}
