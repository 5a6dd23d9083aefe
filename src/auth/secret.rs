//! Shared, redacted credential material.

// self
use crate::_prelude::*;

const REDACTED: &str = "***";

/// Password or bearer value that never reaches a formatter.
///
/// Backed by an `Arc<str>`: the broker hands the same token to every waiter of an exchange,
/// and clones share one allocation.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(Arc<str>);
impl Secret {
	/// Wraps `value`.
	pub fn new(value: impl Into<Arc<str>>) -> Self {
		Self(value.into())
	}

	/// Plain value, for the one place that must send it (a form body or an `Authorization`
	/// header).
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when nothing was provided.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl From<String> for Secret {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}
impl From<&str> for Secret {
	fn from(value: &str) -> Self {
		Self::new(value)
	}
}
impl Debug for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "Secret({REDACTED})")
	}
}
impl Display for Secret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(REDACTED)
	}
}
