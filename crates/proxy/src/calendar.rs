//! Calendar proxy routes.
//!
//! Each request runs `RECEIVED -> AUTH_CHECK -> (UNAUTHORIZED | TOKEN_BUILD
//! -> UPSTREAM_CALL -> (SUCCESS | UPSTREAM_ERROR))`. The calendar client is
//! built for the request and dropped with it.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use mailbridge_auth::{GoogleCredential, GoogleOAuthClient, grant::NO_GRANT_MESSAGE};
use mailbridge_calendar::{
    CalendarClient, CalendarEvent, EventListQuery, FreeBusyQuery, NewEvent, PRIMARY,
    model::DEFAULT_MAX_RESULTS,
};
use mailbridge_config::CalendarTokenSource;
use mailbridge_types::BridgeError;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::{Value, json};
use std::{fmt, sync::Arc};

use crate::{
    AppState,
    error::ApiError,
    session::{Caller, require_identity},
};

#[derive(Debug, Clone, Copy)]
enum Stage {
    Received,
    AuthCheck,
    Unauthorized,
    TokenBuild,
    UpstreamCall,
    Success,
    UpstreamError,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Received => "RECEIVED",
            Self::AuthCheck => "AUTH_CHECK",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::TokenBuild => "TOKEN_BUILD",
            Self::UpstreamCall => "UPSTREAM_CALL",
            Self::Success => "SUCCESS",
            Self::UpstreamError => "UPSTREAM_ERROR",
        })
    }
}

fn stage(op: &'static str, stage: Stage) {
    tracing::debug!(op, stage = %stage, "calendar request");
}

/// `AUTH_CHECK` and `TOKEN_BUILD`: identity, then a Google credential from
/// the configured source, then a client for this request only.
async fn client_for(
    state: &AppState,
    caller: &Caller,
    op: &'static str,
) -> Result<Box<dyn CalendarClient>, ApiError> {
    stage(op, Stage::Received);
    stage(op, Stage::AuthCheck);
    let identity = match require_identity(state, caller).await {
        Ok(identity) => identity,
        Err(e) => {
            stage(op, Stage::Unauthorized);
            return Err(e);
        }
    };

    let source = state.config.load().calendar.token_source;
    let credential = match source {
        CalendarTokenSource::Header => caller.bearer().and_then(GoogleCredential::from_bearer),
        CalendarTokenSource::Session => {
            match state.grants.get_grant(&identity.session_key()).await {
                Ok(token) => GoogleCredential::from_token(&token),
                Err(e) => {
                    stage(op, Stage::Unauthorized);
                    return Err(e.into());
                }
            }
        }
    };
    let Some(credential) = credential else {
        stage(op, Stage::Unauthorized);
        return Err(BridgeError::Unauthenticated(NO_GRANT_MESSAGE.into()).into());
    };

    stage(op, Stage::TokenBuild);
    let oauth = {
        let config = state.config.load();
        let (client_id, client_secret) = config.google_client()?;
        GoogleOAuthClient::new(
            client_id,
            SecretString::from(client_secret.to_string()),
            credential,
        )
    };
    Ok(state.calendars.build(oauth))
}

/// `UPSTREAM_CALL` outcome, classified for the response.
fn finish<T>(
    op: &'static str,
    result: mailbridge_types::traits::Result<T>,
    fallback: &'static str,
) -> Result<T, ApiError> {
    match result {
        Ok(v) => {
            stage(op, Stage::Success);
            Ok(v)
        }
        Err(e) => {
            stage(op, Stage::UpstreamError);
            tracing::warn!(op, error = %e, "calendar upstream call failed");
            Err(ApiError::from(e).or(fallback))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub time_min: Option<String>,
    pub time_max: Option<String>,
    pub max_results: Option<String>,
}

impl ListParams {
    fn into_query(self) -> Result<EventListQuery, BridgeError> {
        let max_results = match self.max_results.as_deref().map(str::trim) {
            None | Some("") => DEFAULT_MAX_RESULTS,
            Some(raw) => raw
                .parse()
                .map_err(|_| BridgeError::Validation(format!("invalid maxResults: {raw}")))?,
        };
        Ok(EventListQuery {
            calendar_id: PRIMARY.to_string(),
            time_min: self.time_min,
            time_max: self.time_max,
            max_results,
        })
    }
}

/// `GET /api/calendar`
pub async fn list_events(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Value>>, ApiError> {
    const OP: &str = "list_events";
    let calendar = client_for(&state, &caller, OP).await?;
    let query = params.into_query()?;
    stage(OP, Stage::UpstreamCall);
    let events = finish(OP, calendar.list_events(&query).await, "Failed to fetch calendar events")?;
    Ok(Json(events))
}

/// `POST /api/calendar`
pub async fn create_event(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(new): Json<NewEvent>,
) -> Result<Json<Value>, ApiError> {
    const OP: &str = "create_event";
    let calendar = client_for(&state, &caller, OP).await?;
    stage(OP, Stage::UpstreamCall);
    let created = finish(OP, calendar.create_event(&new).await, "Failed to create event")?;
    Ok(Json(created))
}

/// `GET /api/calendar/calendars`
pub async fn list_calendars(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<Vec<Value>>, ApiError> {
    const OP: &str = "list_calendars";
    let calendar = client_for(&state, &caller, OP).await?;
    stage(OP, Stage::UpstreamCall);
    let calendars = finish(OP, calendar.list_calendars().await, "Failed to fetch calendars")?;
    Ok(Json(calendars))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarParam {
    pub calendar_id: Option<String>,
}

impl CalendarParam {
    fn id(&self) -> &str {
        self.calendar_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(PRIMARY)
    }
}

/// `GET /api/calendar/events/{id}`
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(event_id): Path<String>,
    Query(cal): Query<CalendarParam>,
) -> Result<Json<Value>, ApiError> {
    const OP: &str = "get_event";
    let calendar = client_for(&state, &caller, OP).await?;
    stage(OP, Stage::UpstreamCall);
    let event = finish(OP, calendar.get_event(cal.id(), &event_id).await, "Failed to fetch event")?;
    Ok(Json(event))
}

/// `PUT /api/calendar/events/{id}`
pub async fn update_event(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(event_id): Path<String>,
    Query(cal): Query<CalendarParam>,
    Json(event): Json<CalendarEvent>,
) -> Result<Json<Value>, ApiError> {
    const OP: &str = "update_event";
    let calendar = client_for(&state, &caller, OP).await?;
    stage(OP, Stage::UpstreamCall);
    let updated = finish(
        OP,
        calendar.update_event(cal.id(), &event_id, &event).await,
        "Failed to update event",
    )?;
    Ok(Json(updated))
}

/// `DELETE /api/calendar/events/{id}`
pub async fn delete_event(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Path(event_id): Path<String>,
    Query(cal): Query<CalendarParam>,
) -> Result<Json<Value>, ApiError> {
    const OP: &str = "delete_event";
    let calendar = client_for(&state, &caller, OP).await?;
    stage(OP, Stage::UpstreamCall);
    finish(
        OP,
        calendar.delete_event(cal.id(), &event_id).await,
        "Failed to delete event",
    )?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickAddBody {
    pub text: String,
    #[serde(default)]
    pub calendar_id: Option<String>,
}

/// `POST /api/calendar/quick-add`
pub async fn quick_add(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(body): Json<QuickAddBody>,
) -> Result<Json<Value>, ApiError> {
    const OP: &str = "quick_add";
    let calendar = client_for(&state, &caller, OP).await?;
    if body.text.trim().is_empty() {
        return Err(BridgeError::Validation("text is required".into()).into());
    }
    let calendar_id = body
        .calendar_id
        .as_deref()
        .filter(|s| !s.is_empty())
        .unwrap_or(PRIMARY);
    stage(OP, Stage::UpstreamCall);
    let event = finish(
        OP,
        calendar.quick_add(calendar_id, &body.text).await,
        "Failed to quick add event",
    )?;
    Ok(Json(event))
}

/// `POST /api/calendar/freebusy`
pub async fn free_busy(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(query): Json<FreeBusyQuery>,
) -> Result<Json<Value>, ApiError> {
    const OP: &str = "free_busy";
    let calendar = client_for(&state, &caller, OP).await?;
    stage(OP, Stage::UpstreamCall);
    let busy = finish(OP, calendar.free_busy(&query).await, "Failed to fetch free/busy")?;
    Ok(Json(busy))
}
