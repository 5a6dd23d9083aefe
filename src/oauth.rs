//! Token exchange seam and the resource-owner password grant built on `oauth2`.

pub use oauth2;

// crates.io
use oauth2::{
	AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpClientError,
	RequestTokenError, ResourceOwnerPassword, ResourceOwnerUsername, Scope, TokenResponse,
	TokenUrl,
	basic::{BasicClient, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{Credentials, DEFAULT_LIFETIME, Secret},
	error::{AuthError, ConfigError},
	http::{ReqwestTransport, StatusSlot, TokenTransport},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Boxed future returned by [`TokenExchanger::exchange`].
pub type ExchangeFuture<'a> =
	Pin<Box<dyn Future<Output = Result<TokenGrant, AuthError>> + 'a + Send>>;

/// Access token and lifetime granted by one successful exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenGrant {
	/// Bearer value.
	pub access_token: Secret,
	/// Lifetime announced by the token endpoint, or the default when it was omitted.
	pub expires_in: Duration,
}
impl TokenGrant {
	/// Creates a grant from a raw bearer value and lifetime.
	pub fn new(access_token: impl Into<Secret>, expires_in: Duration) -> Self {
		Self { access_token: access_token.into(), expires_in }
	}
}

/// Performs one token exchange against the authorization server.
///
/// The broker is the only caller and guarantees at most one exchange is in flight.
pub trait TokenExchanger
where
	Self: Send + Sync,
{
	/// Requests a new access token.
	fn exchange(&self) -> ExchangeFuture<'_>;
}

/// [`TokenExchanger`] speaking the resource-owner password grant with client credentials in
/// the request body.
pub struct PasswordGrantExchanger<T = ReqwestTransport>
where
	T: ?Sized + TokenTransport,
{
	oauth_client: ConfiguredBasicClient,
	credentials: Credentials,
	transport: Arc<T>,
}
impl PasswordGrantExchanger {
	/// Creates an exchanger backed by a fresh reqwest transport.
	pub fn new(credentials: Credentials) -> Result<Self, ConfigError> {
		Self::with_transport(credentials, ReqwestTransport::new()?)
	}
}
impl<T> PasswordGrantExchanger<T>
where
	T: ?Sized + TokenTransport,
{
	/// Creates an exchanger that sends through `transport`.
	pub fn with_transport(
		credentials: Credentials,
		transport: impl Into<Arc<T>>,
	) -> Result<Self, ConfigError> {
		let token_url = TokenUrl::new(credentials.token_url.to_string())
			.map_err(|e| ConfigError::InvalidVar { name: "TOKEN_URL", reason: e.to_string() })?;
		let oauth_client = BasicClient::new(ClientId::new(credentials.client_id.clone()))
			.set_client_secret(ClientSecret::new(credentials.client_secret.expose().to_owned()))
			.set_token_uri(token_url)
			.set_auth_type(AuthType::RequestBody);

		Ok(Self { oauth_client, credentials, transport: transport.into() })
	}

	/// Credentials presented on every exchange.
	pub fn credentials(&self) -> &Credentials {
		&self.credentials
	}
}
impl<T> TokenExchanger for PasswordGrantExchanger<T>
where
	T: ?Sized + TokenTransport,
{
	fn exchange(&self) -> ExchangeFuture<'_> {
		let status = StatusSlot::default();

		Box::pin(async move {
			let handle = self.transport.handle(status.clone());
			let username = ResourceOwnerUsername::new(self.credentials.username.clone());
			let password = ResourceOwnerPassword::new(self.credentials.password.expose().to_owned());
			let mut request = self.oauth_client.exchange_password(&username, &password);

			for scope in self.credentials.scopes() {
				request = request.add_scope(Scope::new(scope.to_owned()));
			}
			if let Some(response_type) = &self.credentials.response_type {
				request = request.add_extra_param("response_type", response_type.clone());
			}

			let response = request
				.request_async(&handle)
				.await
				.map_err(|err| map_request_error(status.take(), err))?;

			map_token_response(response)
		})
	}
}
impl<T> Debug for PasswordGrantExchanger<T>
where
	T: ?Sized + TokenTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PasswordGrantExchanger")
			.field("token_url", &self.credentials.token_url.as_str())
			.field("client_id", &self.credentials.client_id)
			.field("username", &self.credentials.username)
			.finish()
	}
}

fn map_token_response(response: BasicTokenResponse) -> Result<TokenGrant, AuthError> {
	let access_token = response.access_token().secret();

	if access_token.is_empty() {
		return Err(malformed(Some(200), "access_token is empty"));
	}

	let expires_in = match response.expires_in() {
		Some(lifetime) => {
			let secs = i64::try_from(lifetime.as_secs())
				.map_err(|_| malformed(Some(200), "expires_in is out of range"))?;

			if secs <= 0 {
				return Err(malformed(Some(200), "expires_in must be positive"));
			}

			Duration::seconds(secs)
		},
		None => DEFAULT_LIFETIME,
	};

	Ok(TokenGrant::new(access_token.to_owned(), expires_in))
}

fn map_request_error<E>(
	status: Option<u16>,
	err: BasicRequestTokenError<HttpClientError<E>>,
) -> AuthError
where
	E: 'static + Send + Sync + StdError,
{
	match err {
		RequestTokenError::ServerResponse(response) => AuthError::Rejected {
			status: status.unwrap_or(400),
			detail: serde_json::to_string(&response)
				.unwrap_or_else(|_| response.error().as_ref().to_owned()),
		},
		RequestTokenError::Request(error) => map_transport_error(error),
		RequestTokenError::Parse(error, body) => match status {
			Some(code) if !is_success(code) => AuthError::Rejected {
				status: code,
				detail: String::from_utf8_lossy(&body).into_owned(),
			},
			_ => malformed(status, error.to_string()),
		},
		RequestTokenError::Other(message) => match status {
			Some(code) if !is_success(code) => AuthError::Rejected { status: code, detail: message },
			_ => malformed(status, message),
		},
	}
}

fn map_transport_error<E>(err: HttpClientError<E>) -> AuthError
where
	E: 'static + Send + Sync + StdError,
{
	match err {
		HttpClientError::Reqwest(inner) => AuthError::network(*inner),
		HttpClientError::Http(inner) => AuthError::network(inner),
		HttpClientError::Io(inner) => AuthError::network(inner),
		HttpClientError::Other(message) => AuthError::Client { message },
		_ => AuthError::Client { message: "unknown transport failure".into() },
	}
}

fn malformed(status: Option<u16>, reason: impl Into<String>) -> AuthError {
	AuthError::MalformedResponse { status, reason: reason.into() }
}

fn is_success(status: u16) -> bool {
	(200..300).contains(&status)
}
