mod common;

// std
use std::{path::PathBuf, sync::Arc};
// crates.io
use axum::{
	Router,
	body::{self, Body},
	http::{Method, Request, StatusCode, header},
	response::Response,
};
use httpmock::prelude::*;
use serde_json::Value;
use tower::ServiceExt;
// self
use common::{ScriptedExchanger, Step};
use fleet_token_broker::{
	broker::TokenBroker,
	error::AuthError,
	fetch::AuthenticatedFetch,
	reqwest::Client,
	server::{self, AppState},
	url::Url,
};

fn static_dir() -> PathBuf {
	PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/static")
}

fn app(broker: &TokenBroker) -> Router {
	server::router(AppState::new(broker.clone()), None)
}

async fn send(app: &Router, method: Method, uri: &str) -> Response {
	let request = Request::builder()
		.method(method)
		.uri(uri)
		.body(Body::empty())
		.expect("Request fixture should build.");

	app.clone().oneshot(request).await.expect("Router should be infallible.")
}

async fn json(response: Response) -> Value {
	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Response body should be readable.");

	serde_json::from_slice(&bytes).expect("Response body should be JSON.")
}

async fn text(response: Response) -> String {
	let bytes = body::to_bytes(response.into_body(), usize::MAX)
		.await
		.expect("Response body should be readable.");

	String::from_utf8(bytes.to_vec()).expect("Response body should be UTF-8.")
}

#[tokio::test]
async fn token_route_reports_fresh_then_cached_tokens() {
	let exchanger = Arc::new(ScriptedExchanger::new([Step::Grant("abc123", 3600)]));
	let broker = common::broker(&exchanger);
	let app = app(&broker);
	let fresh = send(&app, Method::GET, "/api/token").await;

	assert_eq!(fresh.status(), StatusCode::OK);

	let fresh = json(fresh).await;

	assert_eq!(fresh["success"], true);
	assert_eq!(fresh["access_token"], "abc123");
	assert_eq!(fresh["expires_in"], 3600);
	assert_eq!(fresh["cached"], false);

	let cached = json(send(&app, Method::GET, "/api/token").await).await;
	let remaining = cached["expires_in"].as_i64().expect("expires_in should be an integer.");

	assert_eq!(cached["access_token"], "abc123");
	assert_eq!(cached["cached"], true);
	assert!((3500..=3600).contains(&remaining), "Unexpected remaining lifetime {remaining}.");
	assert_eq!(exchanger.calls(), 1);
}

#[tokio::test]
async fn token_route_relays_the_rejection_status() {
	let exchanger = Arc::new(ScriptedExchanger::new([Step::Fail(AuthError::Rejected {
		status: 401,
		detail: "{\"error\":\"invalid_client\"}".into(),
	})]));
	let broker = common::broker(&exchanger);
	let response = send(&app(&broker), Method::GET, "/api/token").await;

	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

	let body = json(response).await;

	assert_eq!(body["success"], false);
	assert_eq!(body["error"], "Token request failed: 401");
	assert_eq!(body["detail"], "{\"error\":\"invalid_client\"}");
}

#[tokio::test]
async fn token_route_hides_internal_failures() {
	let exchanger = Arc::new(ScriptedExchanger::new([Step::Fail(AuthError::network(
		std::io::Error::other("connection reset"),
	))]));
	let broker = common::broker(&exchanger);
	let response = send(&app(&broker), Method::GET, "/api/token").await;

	assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

	let body = json(response).await;

	assert_eq!(body["success"], false);
	assert_eq!(body["error"], "Internal server error");
	assert!(body.get("detail").is_none());
}

#[tokio::test]
async fn health_and_logout_track_the_cache() {
	let exchanger = Arc::new(ScriptedExchanger::new([Step::Grant("abc123", 3600)]));
	let broker = common::broker(&exchanger);
	let app = app(&broker);
	let empty = json(send(&app, Method::GET, "/api/health").await).await;

	assert_eq!(empty["status"], "healthy");
	assert_eq!(empty["token_cached"], false);
	assert!(empty["token_expires_at"].is_null());

	broker.init().await.expect("Warm-up exchange should succeed.");

	let warm = json(send(&app, Method::GET, "/api/health").await).await;
	let expires_at = warm["token_expires_at"].as_str().expect("Expiry should be reported.");

	assert_eq!(warm["token_cached"], true);
	assert!(
		time::OffsetDateTime::parse(expires_at, &time::format_description::well_known::Rfc3339)
			.is_ok()
	);

	let logout = send(&app, Method::POST, "/api/logout").await;

	assert_eq!(logout.status(), StatusCode::OK);
	assert_eq!(json(logout).await["success"], true);

	let cleared = json(send(&app, Method::GET, "/api/health").await).await;

	assert_eq!(cleared["token_cached"], false);
	assert!(broker.current().is_none());
}

#[tokio::test]
async fn api_routes_allow_cross_origin_callers() {
	let exchanger = Arc::new(ScriptedExchanger::idle());
	let broker = common::broker(&exchanger);
	let request = Request::builder()
		.uri("/api/health")
		.header(header::ORIGIN, "http://dashboard.example.com")
		.body(Body::empty())
		.expect("Request fixture should build.");
	let response = app(&broker).oneshot(request).await.expect("Router should be infallible.");

	assert_eq!(
		response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).map(|value| value.as_bytes()),
		Some(&b"*"[..])
	);
}

#[tokio::test]
async fn upstream_route_is_absent_without_a_data_api() {
	let exchanger = Arc::new(ScriptedExchanger::idle());
	let broker = common::broker(&exchanger);
	let response = send(&app(&broker), Method::GET, "/api/upstream/vehicles").await;

	assert_eq!(response.status(), StatusCode::NOT_FOUND);
	assert_eq!(exchanger.calls(), 0);
}

#[tokio::test]
async fn upstream_route_relays_status_body_and_query() {
	let server = MockServer::start_async().await;
	let listing = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/v3/vehicles")
				.query_param("limit", "5")
				.header("authorization", "Bearer abc123");
			then.status(200).header("content-type", "application/json").body("[{\"id\":\"42\"}]");
		})
		.await;
	let missing = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v3/vehicles/99");
			then.status(404).body("no such vehicle");
		})
		.await;
	let exchanger = Arc::new(ScriptedExchanger::new([Step::Grant("abc123", 3600)]));
	let broker = common::broker(&exchanger);
	let fetch = AuthenticatedFetch::new(broker.clone(), Client::new())
		.with_base_url(Url::parse(&server.url("/api/v3")).expect("Mock base URL should parse."));
	let app = server::router(AppState::new(broker).with_fetch(fetch), None);
	let found = send(&app, Method::GET, "/api/upstream/vehicles?limit=5").await;

	assert_eq!(found.status(), StatusCode::OK);
	assert_eq!(
		found.headers().get(header::CONTENT_TYPE).map(|value| value.as_bytes()),
		Some(&b"application/json"[..])
	);
	assert_eq!(text(found).await, "[{\"id\":\"42\"}]");

	let not_found = send(&app, Method::GET, "/api/upstream/vehicles/99").await;

	assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
	assert_eq!(text(not_found).await, "no such vehicle");

	listing.assert_calls_async(1).await;
	missing.assert_calls_async(1).await;
}

#[tokio::test]
async fn upstream_route_reports_missing_authentication() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/v3/vehicles");
			then.status(200).body("[]");
		})
		.await;
	let exchanger = Arc::new(ScriptedExchanger::new([Step::Fail(common::rejected(400))]));
	let broker = common::broker(&exchanger);
	let fetch = AuthenticatedFetch::new(broker.clone(), Client::new())
		.with_base_url(Url::parse(&server.url("/api/v3")).expect("Mock base URL should parse."));
	let app = server::router(AppState::new(broker).with_fetch(fetch), None);
	let response = send(&app, Method::GET, "/api/upstream/vehicles").await;

	assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
	assert_eq!(json(response).await["error"], "authentication unavailable");

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn upstream_route_keeps_the_bearer_token_inside_the_data_api() {
	let server = MockServer::start_async().await;
	let attacker = MockServer::start_async().await;
	let stolen = attacker
		.mock_async(|when, then| {
			when.path("/steal");
			then.status(200).body("thanks");
		})
		.await;
	let admin = server
		.mock_async(|when, then| {
			when.path("/admin");
			then.status(200).body("admin console");
		})
		.await;
	let exchanger = Arc::new(ScriptedExchanger::new([Step::Grant("abc123", 3600)]));
	let broker = common::broker(&exchanger);
	let fetch = AuthenticatedFetch::new(broker.clone(), Client::new())
		.with_base_url(Url::parse(&server.url("/api/v3")).expect("Mock base URL should parse."));
	let app = server::router(AppState::new(broker).with_fetch(fetch), None);
	let absolute = send(&app, Method::GET, &format!("/api/upstream/{}", attacker.url("/steal"))).await;

	assert_eq!(absolute.status(), StatusCode::BAD_REQUEST);
	assert_eq!(json(absolute).await["error"], "invalid upstream path");

	let escaped = send(&app, Method::GET, "/api/upstream/%2e%2e/%2e%2e/admin").await;

	assert_eq!(escaped.status(), StatusCode::BAD_REQUEST);

	stolen.assert_calls_async(0).await;
	admin.assert_calls_async(0).await;
	assert_eq!(exchanger.calls(), 0);
}

#[tokio::test]
async fn static_assets_are_served_with_their_headers() {
	let exchanger = Arc::new(ScriptedExchanger::idle());
	let broker = common::broker(&exchanger);
	let app = server::router(AppState::new(broker), Some(static_dir().as_path()));
	let index = send(&app, Method::GET, "/").await;

	assert_eq!(index.status(), StatusCode::OK);
	assert!(text(index).await.contains("Fleet Map"));

	let manifest = send(&app, Method::GET, "/manifest.json").await;

	assert_eq!(
		manifest.headers().get(header::CONTENT_TYPE).map(|value| value.as_bytes()),
		Some(&b"application/manifest+json"[..])
	);

	let worker = send(&app, Method::GET, "/service-worker.js").await;
	let headers = worker.headers();

	assert_eq!(
		headers.get(header::CONTENT_TYPE).map(|value| value.as_bytes()),
		Some(&b"application/javascript"[..])
	);
	assert_eq!(
		headers.get(header::CACHE_CONTROL).map(|value| value.as_bytes()),
		Some(&b"no-cache, no-store, must-revalidate"[..])
	);
	assert_eq!(headers.get(header::PRAGMA).map(|value| value.as_bytes()), Some(&b"no-cache"[..]));
	assert_eq!(headers.get(header::EXPIRES).map(|value| value.as_bytes()), Some(&b"0"[..]));

	let script = send(&app, Method::GET, "/app.js").await;

	assert_eq!(script.status(), StatusCode::OK);
	assert!(text(script).await.contains("/api/token"));

	let health = send(&app, Method::GET, "/api/health").await;

	assert_eq!(health.status(), StatusCode::OK);
}
