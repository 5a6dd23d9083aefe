//! Monotonic wall clock used to stamp and age tokens.
//!
//! The clock anchors a UTC instant to a tokio [`Instant`] and advances with the runtime's
//! monotonic time, so wall-clock jumps never shorten or extend a cached token and paused
//! test runtimes drive token ages deterministically.

// crates.io
use tokio::time::Instant;
// self
use crate::_prelude::*;

/// UTC clock that advances with the tokio runtime's monotonic time.
#[derive(Clone, Copy, Debug)]
pub struct Clock {
	wall: OffsetDateTime,
	mono: Instant,
}
impl Clock {
	/// Anchors the clock at the current UTC instant.
	pub fn new() -> Self {
		Self::anchored(OffsetDateTime::now_utc())
	}

	/// Anchors the clock at `wall`; subsequent readings advance from it.
	pub fn anchored(wall: OffsetDateTime) -> Self {
		Self { wall, mono: Instant::now() }
	}

	/// Current instant.
	pub fn now(&self) -> OffsetDateTime {
		self.wall + self.mono.elapsed()
	}
}
impl Default for Clock {
	fn default() -> Self {
		Self::new()
	}
}
