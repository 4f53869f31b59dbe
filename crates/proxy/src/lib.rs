//! HTTP proxy layer: axum router, route handlers, and error mapping.
//!
//! Serves the calendar proxy under `/api/calendar`, the mail send proxy, and
//! the session bridge endpoints under `/api/session`.

mod calendar;
mod emails;
mod error;
mod session;

pub use error::ApiError;
pub use session::Caller;

use arc_swap::ArcSwap;
use axum::{
    Json, Router,
    http::{
        HeaderName, HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use mailbridge_auth::{CredentialBridge, GrantManager};
use mailbridge_calendar::CalendarClientFactory;
use mailbridge_config::Config;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

/// Shared application state passed to all route handlers.
pub struct AppState {
    /// Server configuration. Atomically swappable for hot-reloading.
    pub config: Arc<ArcSwap<Config>>,
    /// Identity resolution and per-session backend tokens.
    pub bridge: Arc<CredentialBridge>,
    /// Stored Google grants (`calendar.token_source: session`).
    pub grants: Arc<GrantManager>,
    /// Builds a calendar client per request.
    pub calendars: Arc<dyn CalendarClientFactory>,
    /// HTTP client for the mail service.
    pub http: reqwest::Client,
}

impl AppState {
    /// Creates a new shared application state wrapped in an `Arc`.
    pub fn new(
        config: Arc<ArcSwap<Config>>,
        bridge: Arc<CredentialBridge>,
        grants: Arc<GrantManager>,
        calendars: Arc<dyn CalendarClientFactory>,
        http: reqwest::Client,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            bridge,
            grants,
            calendars,
            http,
        })
    }
}

/// CORS for the configured browser origins. Origins that are not valid
/// header values are skipped with a warning.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(origin = %o, error = %e, "ignoring invalid cors origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(session::SESSION_HEADER),
        ])
        .allow_credentials(true)
}

/// Build the full axum router.
///
/// Routes:
/// - GET    /health
/// - GET    /api/calendar                  list events
/// - POST   /api/calendar                  create event
/// - GET    /api/calendar/calendars
/// - GET    /api/calendar/events/{id}
/// - PUT    /api/calendar/events/{id}
/// - DELETE /api/calendar/events/{id}
/// - POST   /api/calendar/quick-add
/// - POST   /api/calendar/freebusy
/// - POST   /api/emails/send               mail service proxy
/// - POST   /api/session/token
/// - POST   /api/session/sign-out
/// - POST   /api/session/grant
///
/// CORS origins are read once, when the router is built.
pub fn make_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.load().cors_origins);
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/calendar",
            get(calendar::list_events).post(calendar::create_event),
        )
        .route("/api/calendar/calendars", get(calendar::list_calendars))
        .route(
            "/api/calendar/events/{id}",
            get(calendar::get_event)
                .put(calendar::update_event)
                .delete(calendar::delete_event),
        )
        .route("/api/calendar/quick-add", post(calendar::quick_add))
        .route("/api/calendar/freebusy", post(calendar::free_busy))
        .route("/api/emails/send", post(emails::send_email))
        .route("/api/session/token", post(session::session_token))
        .route("/api/session/sign-out", post(session::sign_out))
        .route("/api/session/grant", post(session::store_grant))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors),
        )
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "mailbridge" }))
}
