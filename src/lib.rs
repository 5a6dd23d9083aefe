//! Server-side OAuth token proxy for a vehicle-location dashboard: one cached bearer token,
//! single-flight password-grant exchanges, proactive renewal, and an HTTP surface that keeps
//! credentials off the browser.

#![deny(clippy::all, missing_docs)]

pub mod auth;
pub mod broker;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod oauth;
pub mod obs;
pub mod server;

mod _prelude {
	pub use std::{
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::{Arc, Weak},
		time::Duration as StdDuration,
	};

	pub use async_lock::OnceCell as AsyncOnceCell;
	pub use parking_lot::Mutex;
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use reqwest;
pub use url;
