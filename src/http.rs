//! Transport seam between the password-grant exchanger and an HTTP stack.
//!
//! `oauth2` only reports a parse error when the token endpoint answers with something that
//! is not JSON, so every exchange hands its transport a fresh [`StatusSlot`] and reads the
//! recorded status back when classifying the failure.

// crates.io
use oauth2::{AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse};
use reqwest::{Request, redirect::Policy};
// self
use crate::{_prelude::*, error::ConfigError};

/// HTTP stack used for token exchanges.
pub trait TokenTransport
where
	Self: 'static + Send + Sync,
{
	/// Failure raised by the underlying client.
	type Error: 'static + Send + Sync + StdError;

	/// Per-exchange client handed to `oauth2`.
	type Handle: for<'c> AsyncHttpClient<'c, Error = HttpClientError<Self::Error>, Future: 'c + Send>
		+ 'static
		+ Send
		+ Sync;

	/// Returns a handle that clears `status` before sending and records the answer's status.
	fn handle(&self, status: StatusSlot) -> Self::Handle;
}

/// Status code of the last token endpoint answer, shared between transport and exchanger.
#[derive(Clone, Debug, Default)]
pub struct StatusSlot(Arc<Mutex<Option<u16>>>);
impl StatusSlot {
	/// Records the status of an answer.
	pub fn record(&self, status: u16) {
		*self.0.lock() = Some(status);
	}

	/// Forgets any previously recorded status.
	pub fn clear(&self) {
		self.0.lock().take();
	}

	/// Removes and returns the recorded status.
	pub fn take(&self) -> Option<u16> {
		self.0.lock().take()
	}
}

/// [`TokenTransport`] backed by reqwest.
///
/// Token endpoints answer directly; [`ReqwestTransport::new`] builds a client that never
/// follows redirects.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: ReqwestClient,
}
impl ReqwestTransport {
	/// Builds a dedicated client with redirects disabled.
	pub fn new() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().redirect(Policy::none()).build()?;

		Ok(Self { client })
	}

	/// Reuses an existing client.
	pub fn from_client(client: ReqwestClient) -> Self {
		Self { client }
	}

	/// Underlying client.
	pub fn client(&self) -> &ReqwestClient {
		&self.client
	}
}
impl TokenTransport for ReqwestTransport {
	type Error = ReqwestError;
	type Handle = ReqwestHandle;

	fn handle(&self, status: StatusSlot) -> Self::Handle {
		ReqwestHandle { client: self.client.clone(), status }
	}
}

/// Per-exchange handle returned by [`ReqwestTransport`].
#[derive(Clone, Debug)]
pub struct ReqwestHandle {
	client: ReqwestClient,
	status: StatusSlot,
}
impl<'c> AsyncHttpClient<'c> for ReqwestHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.status.clear();

			let request = Request::try_from(request).map_err(Box::new)?;
			let answer = self.client.execute(request).await.map_err(Box::new)?;

			self.status.record(answer.status().as_u16());

			let mut response = HttpResponse::new(Vec::new());

			*response.status_mut() = answer.status();
			*response.headers_mut() = answer.headers().clone();
			*response.body_mut() = answer.bytes().await.map_err(Box::new)?.to_vec();

			Ok(response)
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn status_slot_is_consumed_on_take() {
		let slot = StatusSlot::default();

		slot.record(401);

		assert_eq!(slot.take(), Some(401));
		assert!(slot.take().is_none());

		slot.record(502);
		slot.clear();

		assert!(slot.take().is_none());
	}
}
