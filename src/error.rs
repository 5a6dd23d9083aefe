//! Proxy-level error types shared across the exchange, fetch, and server layers.
//!
//! Every variant is [`Clone`] so a single exchange outcome can be handed to every caller
//! waiting on it; underlying transport errors are kept behind an [`Arc`].

// self
use crate::_prelude::*;

/// Proxy-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Clonable, type-erased error source.
pub type SharedSource = Arc<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// No usable bearer token could be obtained.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// The data API answered with a non-2xx status.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),
	/// An exchange or data call exceeded its deadline.
	#[error(transparent)]
	Timeout(#[from] TimeoutError),
	/// The data API could not be reached.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// A data API payload did not match the expected shape.
	#[error("Upstream response could not be decoded at `{path}`: {message}.")]
	Decode {
		/// Path of the offending field inside the payload.
		path: String,
		/// Decoder message.
		message: String,
	},
}
impl Error {
	/// Returns `true` when the failure means no bearer token is available, including an
	/// exchange that ran out of time.
	pub fn is_auth_unavailable(&self) -> bool {
		matches!(
			self,
			Self::Auth(_) | Self::Timeout(TimeoutError { operation: TimedOperation::Exchange, .. })
		)
	}
}

/// Token endpoint failures.
#[derive(Clone, Debug, ThisError)]
pub enum AuthError {
	/// Token endpoint answered with a non-2xx status.
	#[error("Token request failed: {status}.")]
	Rejected {
		/// HTTP status returned by the token endpoint.
		status: u16,
		/// Raw response body, kept for diagnostics.
		detail: String,
	},
	/// Token endpoint answered 2xx with a body that is not a usable grant.
	#[error("Token endpoint returned a malformed response: {reason}.")]
	MalformedResponse {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// What was wrong with the payload.
		reason: String,
	},
	/// Token endpoint could not be reached.
	#[error("Network error occurred while calling the token endpoint.")]
	Network {
		/// Transport-specific failure.
		#[source]
		source: SharedSource,
	},
	/// The HTTP client failed without a transport error to attach.
	#[error("HTTP client error occurred while calling the token endpoint: {message}.")]
	Client {
		/// Client-supplied message.
		message: String,
	},
	/// The exchange task ended without producing an outcome.
	#[error("Token exchange was aborted: {reason}.")]
	Aborted {
		/// Why the task ended.
		reason: String,
	},
	/// The cache was invalidated while this exchange was in flight.
	#[error("Token cache was invalidated while the exchange was in flight.")]
	Invalidated,
	/// The broker has been shut down.
	#[error("Token broker has been shut down.")]
	Closed,
}
impl AuthError {
	/// Wraps a transport failure raised while calling the token endpoint.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}

/// Non-2xx answer from the upstream data API.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("Upstream request failed with status {status}.")]
pub struct UpstreamError {
	/// HTTP status returned by the data API.
	pub status: u16,
	/// Response body, kept for diagnostics.
	pub body: String,
}

/// Operation guarded by a deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimedOperation {
	/// OAuth exchange against the token endpoint.
	Exchange,
	/// Call against the upstream data API.
	DataCall,
}
impl TimedOperation {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Exchange => "token exchange",
			Self::DataCall => "data call",
		}
	}
}
impl Display for TimedOperation {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Deadline exceeded.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("The {operation} exceeded its {}ms deadline.", .after.as_millis())]
pub struct TimeoutError {
	/// Which operation timed out.
	pub operation: TimedOperation,
	/// Deadline that was exceeded.
	pub after: StdDuration,
}
impl TimeoutError {
	/// Creates a timeout for the provided operation and deadline.
	pub fn new(operation: TimedOperation, after: StdDuration) -> Self {
		Self { operation, after }
	}
}

/// Transport-level failures while calling the data API.
#[derive(Clone, Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the data API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: SharedSource,
	},
	/// The outbound request could not be assembled.
	#[error("Data API request could not be built: {message}.")]
	Request {
		/// Builder message.
		message: String,
	},
	/// The requested path resolves outside the configured data API root.
	#[error("Data API path `{path}` resolves outside the configured base URL.")]
	OutsideBase {
		/// Path as supplied by the caller.
		path: String,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}
}
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Configuration failures raised at startup.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// A required environment variable is absent or empty.
	#[error("Missing required environment variable {name}.")]
	MissingVar {
		/// Variable name.
		name: &'static str,
	},
	/// An environment variable could not be parsed.
	#[error("Environment variable {name} is invalid: {reason}.")]
	InvalidVar {
		/// Variable name.
		name: &'static str,
		/// Parser message.
		reason: String,
	},
	/// Only the resource-owner password grant is supported.
	#[error("Grant type `{0}` is not supported; only `password` is.")]
	UnsupportedGrant(String),
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedSource,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}
