//! HTTP surface: token and health endpoints for the dashboard, the data API pass-through, and
//! the dashboard's static assets.

// std
use std::path::Path as FsPath;
// crates.io
use axum::{
	Json, Router,
	extract::{Path, RawQuery, State},
	http::{
		HeaderValue, StatusCode,
		header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA},
	},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use reqwest::{Method, Request};
use time::format_description::well_known::Rfc3339;
use tower_http::{
	cors::CorsLayer,
	services::{ServeDir, ServeFile},
	set_header::SetResponseHeader,
	trace::TraceLayer,
};
// self
use crate::{
	_prelude::*,
	broker::{TokenBroker, TokenSource},
	error::{AuthError, TimedOperation, TimeoutError, TransportError, UpstreamError},
	fetch::AuthenticatedFetch,
};

/// Shared state handed to every handler.
#[derive(Clone, Debug)]
pub struct AppState {
	/// Token owner.
	pub broker: TokenBroker,
	/// Data API client; the pass-through route answers 404 without it.
	pub fetch: Option<AuthenticatedFetch>,
}
impl AppState {
	/// Creates state without a data API client.
	pub fn new(broker: TokenBroker) -> Self {
		Self { broker, fetch: None }
	}

	/// Enables the data API pass-through.
	pub fn with_fetch(mut self, fetch: AuthenticatedFetch) -> Self {
		self.fetch = Some(fetch);

		self
	}
}

#[derive(Debug, Serialize)]
struct TokenBody {
	success: bool,
	access_token: String,
	expires_in: i64,
	cached: bool,
}

#[derive(Debug, Serialize)]
struct FailureBody {
	success: bool,
	error: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	detail: Option<String>,
}
impl FailureBody {
	fn new(error: impl Into<String>) -> Self {
		Self { success: false, error: error.into(), detail: None }
	}
}

#[derive(Debug, Serialize)]
struct HealthBody {
	status: &'static str,
	token_cached: bool,
	token_expires_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct LogoutBody {
	success: bool,
}

/// Builds the application router.
///
/// `/api/*` routes carry permissive CORS. When `static_dir` is set, `/` serves its
/// `index.html`, `manifest.json` and `service-worker.js` get their dedicated headers, and any
/// other path falls back to the directory.
pub fn router(state: AppState, static_dir: Option<&FsPath>) -> Router {
	let api = Router::new()
		.route("/api/token", get(token))
		.route("/api/health", get(health))
		.route("/api/logout", post(logout))
		.route("/api/upstream/{*path}", get(upstream))
		.layer(CorsLayer::permissive())
		.with_state(state);
	let app = match static_dir {
		Some(dir) => api.merge(static_assets(dir)),
		None => api,
	};

	app.layer(TraceLayer::new_for_http())
}

fn static_assets(dir: &FsPath) -> Router {
	let manifest = SetResponseHeader::overriding(
		ServeFile::new(dir.join("manifest.json")),
		CONTENT_TYPE,
		HeaderValue::from_static("application/manifest+json"),
	);
	let service_worker = SetResponseHeader::overriding(
		ServeFile::new(dir.join("service-worker.js")),
		CONTENT_TYPE,
		HeaderValue::from_static("application/javascript"),
	);
	let service_worker = SetResponseHeader::overriding(
		service_worker,
		CACHE_CONTROL,
		HeaderValue::from_static("no-cache, no-store, must-revalidate"),
	);
	let service_worker =
		SetResponseHeader::overriding(service_worker, PRAGMA, HeaderValue::from_static("no-cache"));
	let service_worker =
		SetResponseHeader::overriding(service_worker, EXPIRES, HeaderValue::from_static("0"));

	Router::new()
		.route_service("/", ServeFile::new(dir.join("index.html")))
		.route_service("/manifest.json", manifest)
		.route_service("/service-worker.js", service_worker)
		.fallback_service(ServeDir::new(dir))
}

async fn token(State(state): State<AppState>) -> Response {
	match state.broker.acquire().await {
		Ok(acquired) => {
			let expires_in = match acquired.source {
				TokenSource::Exchange => acquired.token.lifetime(),
				TokenSource::Cache | TokenSource::Stale =>
					acquired.token.remaining_at(state.broker.now()),
			}
			.whole_seconds();

			Json(TokenBody {
				success: true,
				access_token: acquired.token.value.expose().to_owned(),
				expires_in,
				cached: acquired.is_cached(),
			})
			.into_response()
		},
		Err(Error::Auth(AuthError::Rejected { status, detail })) => {
			tracing::warn!(status, "token endpoint rejected the exchange");

			let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
			let body = FailureBody {
				success: false,
				error: format!("Token request failed: {status}"),
				detail: Some(detail),
			};

			(code, Json(body)).into_response()
		},
		Err(e) => {
			tracing::error!(error = %e, "token request failed");

			failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
		},
	}
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
	let snapshot = state.broker.snapshot();

	Json(HealthBody {
		status: "healthy",
		token_cached: snapshot.token_cached,
		token_expires_at: snapshot.expires_at.and_then(|at| at.format(&Rfc3339).ok()),
	})
}

async fn logout(State(state): State<AppState>) -> Json<LogoutBody> {
	state.broker.invalidate();

	Json(LogoutBody { success: true })
}

async fn upstream(
	State(state): State<AppState>,
	Path(path): Path<String>,
	RawQuery(query): RawQuery,
) -> Response {
	let Some(fetch) = state.fetch.as_ref() else {
		return failure(StatusCode::NOT_FOUND, "upstream data API is not configured");
	};
	let mut url = match fetch.endpoint(&path) {
		Ok(url) => url,
		Err(e) => return upstream_failure(e),
	};

	url.set_query(query.as_deref());

	let response = match fetch.call(Request::new(Method::GET, url)).await {
		Ok(response) => response,
		Err(e) => return upstream_failure(e),
	};
	let status = response.status();
	let content_type = response.headers().get(CONTENT_TYPE).cloned();
	let body = match response.bytes().await {
		Ok(body) => body,
		Err(e) if e.is_timeout() =>
			return upstream_failure(
				TimeoutError::new(TimedOperation::DataCall, fetch.timeout()).into(),
			),
		Err(e) => return upstream_failure(TransportError::from(e).into()),
	};
	let mut relayed = (status, body).into_response();

	if let Some(content_type) = content_type {
		relayed.headers_mut().insert(CONTENT_TYPE, content_type);
	}

	relayed
}

fn upstream_failure(err: Error) -> Response {
	if err.is_auth_unavailable() {
		tracing::warn!(error = %err, "no bearer token available for the data API");

		return failure(StatusCode::SERVICE_UNAVAILABLE, "authentication unavailable");
	}

	match err {
		Error::Upstream(UpstreamError { status, body }) =>
			(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY), body).into_response(),
		Error::Timeout(_) => failure(StatusCode::GATEWAY_TIMEOUT, "upstream timed out"),
		Error::Transport(TransportError::OutsideBase { path }) => {
			tracing::warn!(%path, "refused a pass-through path outside the data API");

			failure(StatusCode::BAD_REQUEST, "invalid upstream path")
		},
		Error::Transport(e) => {
			tracing::warn!(error = %e, "data API unreachable");

			failure(StatusCode::BAD_GATEWAY, "upstream unreachable")
		},
		e => {
			tracing::error!(error = %e, "pass-through failed");

			failure(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
		},
	}
}

fn failure(status: StatusCode, error: &str) -> Response {
	(status, Json(FailureBody::new(error))).into_response()
}
