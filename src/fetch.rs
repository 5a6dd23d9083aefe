//! Bearer-authenticated calls against the upstream data API.

// crates.io
use reqwest::{
	Method, Request, Response, StatusCode,
	header::{AUTHORIZATION, HeaderValue},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	broker::TokenBroker,
	error::{ConfigError, TimedOperation, TimeoutError, TransportError, UpstreamError},
};

/// Deadline applied to data API calls that do not carry their own.
pub const DEFAULT_DATA_TIMEOUT: StdDuration = StdDuration::from_secs(30);

/// Data API client that asks the broker for a token before every call.
///
/// A 401 from the data API is surfaced as [`UpstreamError`] like any other non-2xx answer;
/// the cache is left untouched and nothing is retried.
#[derive(Clone, Debug)]
pub struct AuthenticatedFetch {
	broker: TokenBroker,
	client: ReqwestClient,
	base_url: Option<Url>,
	timeout: StdDuration,
}
impl AuthenticatedFetch {
	/// Creates a fetcher with no base URL and the default data timeout.
	pub fn new(broker: TokenBroker, client: ReqwestClient) -> Self {
		Self { broker, client, base_url: None, timeout: DEFAULT_DATA_TIMEOUT }
	}

	/// Sets the data API root that relative paths resolve against.
	pub fn with_base_url(mut self, mut base_url: Url) -> Self {
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());

			base_url.set_path(&path);
		}

		self.base_url = Some(base_url);

		self
	}

	/// Overrides the data call deadline (defaults to [`DEFAULT_DATA_TIMEOUT`]).
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = timeout;

		self
	}

	/// Broker supplying bearer tokens.
	pub fn broker(&self) -> &TokenBroker {
		&self.broker
	}

	/// Underlying HTTP client.
	pub fn client(&self) -> &ReqwestClient {
		&self.client
	}

	/// Deadline applied to calls that do not carry their own.
	pub fn timeout(&self) -> StdDuration {
		self.timeout
	}

	/// Resolves `path` against the configured data API root.
	///
	/// The bearer token is only ever sent below that root: absolute URLs, scheme-relative
	/// URLs and dot segments that leave it fail with [`TransportError::OutsideBase`].
	pub fn endpoint(&self, path: &str) -> Result<Url> {
		let base = self.base_url.as_ref().ok_or(ConfigError::MissingVar { name: "API_BASE_URL" })?;
		let url = base
			.join(path.trim_start_matches('/'))
			.map_err(|e| TransportError::Request { message: e.to_string() })?;

		if url.origin() != base.origin() || !url.path().starts_with(base.path()) {
			return Err(TransportError::OutsideBase { path: path.to_owned() }.into());
		}

		Ok(url)
	}

	/// Sends `request` with a bearer token attached.
	///
	/// Token failures short-circuit before any network traffic. Non-2xx answers become
	/// [`UpstreamError`] carrying the response body.
	pub async fn call(&self, mut request: Request) -> Result<Response> {
		let token = self.broker.get_valid_token().await?;
		let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.value.expose()))
			.map_err(|e| TransportError::Request { message: e.to_string() })?;

		bearer.set_sensitive(true);
		request.headers_mut().insert(AUTHORIZATION, bearer);

		let deadline = *request.timeout_mut().get_or_insert(self.timeout);
		let method = request.method().clone();
		let path = request.url().path().to_owned();

		tracing::debug!(%method, %path, "calling data API");

		let response =
			self.client.execute(request).await.map_err(|e| self.map_send_error(e, deadline))?;
		let status = response.status();

		if status.is_success() {
			return Ok(response);
		}
		if status == StatusCode::UNAUTHORIZED {
			tracing::warn!(%method, %path, "data API rejected the bearer token");
		}

		let body = match response.text().await {
			Ok(body) => body,
			Err(e) => {
				tracing::debug!(%method, %path, error = %e, "data API error body could not be read");

				String::new()
			},
		};

		Err(UpstreamError { status: status.as_u16(), body }.into())
	}

	/// `GET`s `path` relative to the data API root.
	pub async fn get(&self, path: &str) -> Result<Response> {
		let url = self.endpoint(path)?;

		self.call(Request::new(Method::GET, url)).await
	}

	/// `GET`s `path` and decodes the JSON body, reporting the failing field path on mismatch.
	pub async fn get_json<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let response = self.get(path).await?;
		let body = response.bytes().await.map_err(|e| self.map_send_error(e, self.timeout))?;
		let mut de = serde_json::Deserializer::from_slice(&body);

		serde_path_to_error::deserialize(&mut de).map_err(|e| Error::Decode {
			path: e.path().to_string(),
			message: e.inner().to_string(),
		})
	}

	fn map_send_error(&self, err: ReqwestError, deadline: StdDuration) -> Error {
		if err.is_timeout() {
			tracing::warn!(
				timeout_ms = deadline.as_millis() as u64,
				"timeout: data call exceeded its deadline"
			);

			return TimeoutError::new(TimedOperation::DataCall, deadline).into();
		}
		if err.is_builder() {
			return TransportError::Request { message: err.to_string() }.into();
		}

		TransportError::from(err).into()
	}
}
