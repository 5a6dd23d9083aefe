//! Static OAuth credentials for the resource-owner password grant.

// self
use crate::{_prelude::*, auth::Secret};

/// Credentials loaded once at startup and shared read-only with the exchanger.
#[derive(Clone, Debug)]
pub struct Credentials {
	/// Token endpoint receiving the password grant.
	pub token_url: Url,
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret, sent in the request body.
	pub client_secret: Secret,
	/// Resource-owner username.
	pub username: String,
	/// Resource-owner password.
	pub password: Secret,
	/// Space-delimited scope string.
	pub scope: String,
	/// Extra `response_type` parameter some providers expect alongside the grant.
	pub response_type: Option<String>,
}
impl Credentials {
	/// Iterates over the individual scopes of the configured scope string.
	pub fn scopes(&self) -> impl Iterator<Item = &str> {
		self.scope.split_whitespace()
	}
}
