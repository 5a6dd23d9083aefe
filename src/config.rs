//! Startup configuration read from the process environment.
//!
//! A `.env` file in the working directory is loaded first when present. Values are trimmed and
//! empty values count as unset.

// std
use std::{io::ErrorKind, path::PathBuf};
// self
use crate::{
	_prelude::*,
	auth::{Credentials, Secret},
	broker::DEFAULT_EXCHANGE_TIMEOUT,
	error::ConfigError,
	fetch::DEFAULT_DATA_TIMEOUT,
};

/// Token endpoint used when `TOKEN_URL` is unset.
pub const DEFAULT_TOKEN_URL: &str = "https://login.mzoneweb.net/connect/token";
/// Scope string used when `SCOPE` is unset.
pub const DEFAULT_SCOPE: &str = "mz6-api.all mz_username";
/// `response_type` parameter used when `RESPONSE_TYPE` is unset.
pub const DEFAULT_RESPONSE_TYPE: &str = "code id_token";
/// Bind host used when `HOST` is unset.
pub const DEFAULT_HOST: &str = "0.0.0.0";
/// Bind port used when `PORT` is unset.
pub const DEFAULT_PORT: u16 = 5000;

/// HTTP server settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
	/// Bind host.
	pub host: String,
	/// Bind port.
	pub port: u16,
	/// Directory holding the dashboard's static assets.
	pub static_dir: Option<PathBuf>,
}

/// Complete process configuration.
#[derive(Clone, Debug)]
pub struct Config {
	/// OAuth credentials for the password grant.
	pub credentials: Credentials,
	/// HTTP server settings.
	pub server: ServerConfig,
	/// Data API root; the pass-through route is disabled without it.
	pub api_base_url: Option<Url>,
	/// Deadline for one token exchange.
	pub exchange_timeout: StdDuration,
	/// Deadline for one data API call.
	pub data_timeout: StdDuration,
	/// Verbose logging.
	pub debug: bool,
}
impl Config {
	/// Loads `.env` (if any) and reads the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		dotenv_outcome(dotenvy::dotenv())?;

		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Reads configuration through `lookup`, which maps a variable name to its raw value.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| {
			lookup(name).map(|value| value.trim().to_owned()).filter(|value| !value.is_empty())
		};
		let required = |name: &'static str| var(name).ok_or(ConfigError::MissingVar { name });
		let grant_type = var("GRANT_TYPE").unwrap_or_else(|| "password".into());

		if grant_type != "password" {
			return Err(ConfigError::UnsupportedGrant(grant_type));
		}

		let token_url = var("TOKEN_URL").unwrap_or_else(|| DEFAULT_TOKEN_URL.into());
		let token_url = parse_url("TOKEN_URL", &token_url)?;
		let username = var("OAUTH_USERNAME")
			.or_else(|| var("USERNAME"))
			.ok_or(ConfigError::MissingVar { name: "OAUTH_USERNAME" })?;
		let password = var("OAUTH_PASSWORD")
			.or_else(|| var("PASSWORD"))
			.ok_or(ConfigError::MissingVar { name: "OAUTH_PASSWORD" })?;
		let response_type = var("RESPONSE_TYPE").unwrap_or_else(|| DEFAULT_RESPONSE_TYPE.into());
		let credentials = Credentials {
			token_url,
			client_id: required("CLIENT_ID")?,
			client_secret: Secret::new(required("CLIENT_SECRET")?),
			username,
			password: Secret::new(password),
			scope: var("SCOPE").unwrap_or_else(|| DEFAULT_SCOPE.into()),
			response_type: Some(response_type),
		};
		let port = match var("PORT") {
			Some(raw) => raw.parse::<u16>().map_err(|e| invalid("PORT", e))?,
			None => DEFAULT_PORT,
		};
		let server = ServerConfig {
			host: var("HOST").unwrap_or_else(|| DEFAULT_HOST.into()),
			port,
			static_dir: var("STATIC_DIR").map(PathBuf::from),
		};
		let api_base_url =
			var("API_BASE_URL").map(|raw| parse_url("API_BASE_URL", &raw)).transpose()?;
		let exchange_timeout = match var("EXCHANGE_TIMEOUT_SECS") {
			Some(raw) => parse_secs("EXCHANGE_TIMEOUT_SECS", &raw)?,
			None => DEFAULT_EXCHANGE_TIMEOUT,
		};
		let data_timeout = match var("DATA_TIMEOUT_SECS") {
			Some(raw) => parse_secs("DATA_TIMEOUT_SECS", &raw)?,
			None => DEFAULT_DATA_TIMEOUT,
		};
		let debug = var("DEBUG").is_some_and(|value| value.eq_ignore_ascii_case("true"));

		Ok(Self { credentials, server, api_base_url, exchange_timeout, data_timeout, debug })
	}

	/// `host:port` string the server binds to.
	pub fn bind_addr(&self) -> String {
		format!("{}:{}", self.server.host, self.server.port)
	}
}

/// Accepts a loaded or absent `.env` file; anything else is a configuration error.
fn dotenv_outcome(outcome: dotenvy::Result<PathBuf>) -> Result<(), ConfigError> {
	match outcome {
		Ok(path) => {
			tracing::debug!(path = %path.display(), "loaded .env file");

			Ok(())
		},
		Err(dotenvy::Error::Io(e)) if e.kind() == ErrorKind::NotFound => Ok(()),
		Err(e) => Err(invalid(".env", e)),
	}
}

fn parse_url(name: &'static str, raw: &str) -> Result<Url, ConfigError> {
	Url::parse(raw).map_err(|e| invalid(name, e))
}

fn parse_secs(name: &'static str, raw: &str) -> Result<StdDuration, ConfigError> {
	match raw.parse::<u64>() {
		Ok(0) => Err(invalid(name, "must be positive")),
		Ok(secs) => Ok(StdDuration::from_secs(secs)),
		Err(e) => Err(invalid(name, e)),
	}
}

fn invalid(name: &'static str, reason: impl Display) -> ConfigError {
	ConfigError::InvalidVar { name, reason: reason.to_string() }
}
