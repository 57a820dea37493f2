//! Web layer - HTTP routes, sessions and response negotiation
//!
//! This module is the HTTP interface over [`crate::core`]. Handlers are thin: they extract
//! the caller's [`AuthContext`](crate::core::access::AuthContext), call one core operation
//! and hand the result to a [`respond::View`].

/// Route gates and the `Auth` extractor
pub mod gate;
/// Route handlers grouped by area
pub mod handlers;
/// Page rendering for browser clients
pub mod render;
/// API/page negotiation, request payloads and error responses
pub mod respond;
/// Typed session values (identity, flash)
pub mod session;
/// Database-backed session store
pub mod session_store;

use crate::config::settings::AppConfig;
use crate::core::payments::{MockPaymentProcessor, PaymentProcessor};
use crate::errors::Result;
use axum::Router;
use axum::middleware;
use render::{HtmlShell, ViewRenderer};
use sea_orm::DatabaseConnection;
use session_store::SeaOrmSessionStore;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tower_sessions::session_store::ExpiredDeletion;
use tower_sessions::{Expiry, SessionManagerLayer};
use tracing::{info, instrument, warn};

/// Shared state available to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection for all operations
    pub db: DatabaseConnection,
    /// Loaded configuration
    pub config: Arc<AppConfig>,
    /// Gateway used to charge and refund payments
    pub processor: Arc<dyn PaymentProcessor>,
    /// Page renderer for browser clients
    pub renderer: Arc<dyn ViewRenderer>,
}

impl AppState {
    /// Creates state with the mock payment processor and the built-in HTML renderer.
    #[must_use]
    pub fn new(db: DatabaseConnection, config: AppConfig) -> Self {
        let processor = MockPaymentProcessor::new(config.payments.decline_all);
        Self {
            db,
            config: Arc::new(config),
            processor: Arc::new(processor),
            renderer: Arc::new(HtmlShell),
        }
    }

    /// Replaces the payment processor.
    #[must_use]
    pub fn with_processor(mut self, processor: Arc<dyn PaymentProcessor>) -> Self {
        self.processor = processor;
        self
    }

    /// Replaces the page renderer.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn ViewRenderer>) -> Self {
        self.renderer = renderer;
        self
    }
}

/// Assembles every route with its gate, the session layer and request tracing.
pub fn router(state: AppState) -> Router {
    let server = &state.config.server;
    let sessions = SessionManagerLayer::new(SeaOrmSessionStore::new(state.db.clone()))
        .with_name(server.session_cookie.clone())
        .with_secure(server.secure_cookies)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::hours(state.config.auth.session_ttl_hours),
        ));

    Router::new()
        .merge(handlers::public_routes())
        .merge(handlers::signed_in_routes().route_layer(middleware::from_fn_with_state(state.clone(), gate::signed_in)))
        .nest(
            "/admin",
            handlers::admin::routes().route_layer(middleware::from_fn_with_state(state.clone(), gate::admins)),
        )
        .nest(
            "/teacher",
            handlers::teacher::routes().route_layer(middleware::from_fn_with_state(state.clone(), gate::teachers)),
        )
        .nest(
            "/student",
            handlers::student::routes().route_layer(middleware::from_fn_with_state(state.clone(), gate::students)),
        )
        .nest("/courses", handlers::courses::routes(&state))
        .nest("/payments", handlers::payments::routes(&state))
        .layer(middleware::from_fn_with_state(state.clone(), respond::negotiate))
        .layer(sessions)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Removes expired session rows every `period` until the process exits.
pub fn spawn_session_sweeper(db: DatabaseConnection, period: Duration) {
    let store = SeaOrmSessionStore::new(db);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = store.delete_expired().await {
                warn!("Expired session sweep failed: {e}");
            }
        }
    });
}

/// Binds the configured address and serves until Ctrl-C.
#[instrument(skip(state))]
pub async fn serve(state: AppState) -> Result<()> {
    let addr = state.config.server.bind_addr.clone();
    spawn_session_sweeper(state.db.clone(), Duration::from_secs(3600));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}");
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Could not listen for shutdown signal: {e}");
        }
        info!("Shutdown signal received");
    })
    .await?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Helpers for driving the router in tests.
    #![allow(clippy::unwrap_used)]

    use super::{AppState, router};
    use crate::config::settings::AppConfig;
    use crate::test_utils::{TEST_PASSWORD, setup_test_db};
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode, header};
    use http_body_util::BodyExt;
    use sea_orm::DatabaseConnection;
    use serde_json::Value;
    use tower::ServiceExt;

    pub async fn app() -> (Router, DatabaseConnection) {
        let db = setup_test_db().await.unwrap();
        let mut config = AppConfig::default();
        config.auth.bcrypt_cost = crate::config::settings::MIN_BCRYPT_COST;
        (router(AppState::new(db.clone(), config)), db)
    }

    pub fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::ACCEPT, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub fn form_request(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
        app.clone().oneshot(request).await.unwrap()
    }

    pub async fn body_json(response: Response<Body>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    pub async fn body_text(response: Response<Body>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// `name=value` of the session cookie set by `response`.
    pub fn session_cookie(response: &Response<Body>) -> Option<String> {
        response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("lms.sid="))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }

    /// Logs in through the API and returns the session cookie.
    pub async fn login(app: &Router, email: &str) -> String {
        let body = serde_json::json!({ "email": email, "password": TEST_PASSWORD });
        let response = send(app, json_request("POST", "/auth/login", None, Some(body))).await;
        assert_eq!(response.status(), StatusCode::OK);
        session_cookie(&response).unwrap()
    }
}
