//! Google Calendar v3 REST client.

use async_trait::async_trait;
use mailbridge_auth::GoogleOAuthClient;
use mailbridge_types::{BridgeError, traits::Result};
use reqwest::{Client, Method, RequestBuilder, Response, Url};
use serde_json::Value;

use crate::{
    CalendarClient, CalendarClientFactory,
    model::{CalendarEvent, EventListQuery, FreeBusyQuery, NewEvent, conference_request_id},
};

/// Google's error text: `error.message` when the body has one, else the
/// raw body (which keeps OAuth errors like `invalid_grant` visible).
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

async fn send(builder: RequestBuilder) -> Result<Response> {
    let resp = builder.send().await?;
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(BridgeError::Upstream {
        status: status.as_u16(),
        body: error_message(&text),
    })
}

/// One caller's view of Google Calendar.
pub struct GoogleCalendarClient {
    http: Client,
    api_base: String,
    oauth: GoogleOAuthClient,
}

impl GoogleCalendarClient {
    pub fn new(http: Client, api_base: impl Into<String>, oauth: GoogleOAuthClient) -> Self {
        Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            oauth,
        }
    }

    /// `api_base` joined with percent-encoded path segments.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| BridgeError::Config(format!("invalid calendar api base: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| BridgeError::Config("calendar api base cannot be a base".into()))?
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.oauth.authorize(self.http.request(method, url))
    }

    async fn json(&self, builder: RequestBuilder) -> Result<Value> {
        Ok(send(builder).await?.json().await?)
    }
}

fn items(mut body: Value) -> Vec<Value> {
    match body.get_mut("items").map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

#[async_trait]
impl CalendarClient for GoogleCalendarClient {
    async fn list_events(&self, query: &EventListQuery) -> Result<Vec<Value>> {
        let url = self.url(&["calendars", &query.calendar_id, "events"])?;
        tracing::debug!(calendar = %query.calendar_id, "listing calendar events");
        let body = self
            .json(self.request(Method::GET, url).query(&query.params()))
            .await?;
        Ok(items(body))
    }

    async fn create_event(&self, new: &NewEvent) -> Result<Value> {
        let url = self.url(&["calendars", new.calendar_id(), "events"])?;
        let request_id = new.add_meet.then(conference_request_id);
        let conference_version = if new.add_meet { "1" } else { "0" };
        tracing::debug!(calendar = %new.calendar_id(), add_meet = new.add_meet, "creating calendar event");
        self.json(
            self.request(Method::POST, url)
                .query(&[
                    ("conferenceDataVersion", conference_version),
                    ("sendUpdates", "all"),
                ])
                .json(&new.event.to_insert_body(request_id.as_deref())),
        )
        .await
    }

    async fn list_calendars(&self) -> Result<Vec<Value>> {
        let url = self.url(&["users", "me", "calendarList"])?;
        let body = self.json(self.request(Method::GET, url)).await?;
        Ok(items(body))
    }

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Value> {
        let url = self.url(&["calendars", calendar_id, "events", event_id])?;
        self.json(self.request(Method::GET, url)).await
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        event: &CalendarEvent,
    ) -> Result<Value> {
        let url = self.url(&["calendars", calendar_id, "events", event_id])?;
        self.json(
            self.request(Method::PUT, url)
                .query(&[("sendUpdates", "all")])
                .json(event),
        )
        .await
    }

    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<()> {
        let url = self.url(&["calendars", calendar_id, "events", event_id])?;
        send(
            self.request(Method::DELETE, url)
                .query(&[("sendUpdates", "all")]),
        )
        .await?;
        Ok(())
    }

    async fn quick_add(&self, calendar_id: &str, text: &str) -> Result<Value> {
        let url = self.url(&["calendars", calendar_id, "events", "quickAdd"])?;
        self.json(self.request(Method::POST, url).query(&[("text", text)]))
            .await
    }

    async fn free_busy(&self, query: &FreeBusyQuery) -> Result<Value> {
        let url = self.url(&["freeBusy"])?;
        self.json(
            self.request(Method::POST, url)
                .json(&query.to_request_body()),
        )
        .await
    }
}

/// Builds [`GoogleCalendarClient`]s sharing one connection pool.
#[derive(Clone)]
pub struct GoogleCalendarFactory {
    http: Client,
    api_base: String,
}

impl GoogleCalendarFactory {
    pub fn new(http: Client, api_base: impl Into<String>) -> Self {
        Self {
            http,
            api_base: api_base.into(),
        }
    }
}

impl CalendarClientFactory for GoogleCalendarFactory {
    fn build(&self, oauth: GoogleOAuthClient) -> Box<dyn CalendarClient> {
        Box::new(GoogleCalendarClient::new(
            self.http.clone(),
            self.api_base.clone(),
            oauth,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::{Path, Query},
        http::{HeaderMap, StatusCode, Uri},
        response::IntoResponse,
        routing::{get, post, put},
    };
    use mailbridge_auth::GoogleCredential;
    use secrecy::SecretString;
    use serde_json::json;
    use std::collections::HashMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/calendar/v3")
    }

    fn calendar(base: &str, token: &str) -> Box<dyn CalendarClient> {
        let oauth = GoogleOAuthClient::new(
            "cid",
            SecretString::from("secret".to_string()),
            GoogleCredential::from_bearer(token).unwrap(),
        );
        GoogleCalendarFactory::new(Client::new(), base).build(oauth)
    }

    fn bearer(headers: &HeaderMap) -> &str {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }

    async fn list(
        headers: HeaderMap,
        Path(cal): Path<String>,
        Query(q): Query<HashMap<String, String>>,
    ) -> impl IntoResponse {
        if bearer(&headers) != "Bearer ya29.good" {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {"code": 401, "message": "Invalid Credentials"}})),
            );
        }
        assert_eq!(cal, "primary");
        assert_eq!(q["singleEvents"], "true");
        assert_eq!(q["orderBy"], "startTime");
        assert!(!q.contains_key("timeMax"));
        (
            StatusCode::OK,
            Json(json!({"items": [{"id": "e1", "summary": "Standup"}], "maxResults": q["maxResults"]})),
        )
    }

    #[test]
    fn test_error_message_prefers_google_message() {
        assert_eq!(
            error_message(r#"{"error":{"code":403,"message":"Rate Limit Exceeded"}}"#),
            "Rate Limit Exceeded"
        );
        assert_eq!(
            error_message(r#"{"error":"invalid_grant"}"#),
            r#"{"error":"invalid_grant"}"#
        );
    }

    #[tokio::test]
    async fn test_list_events() {
        let base = serve(Router::new().route("/calendar/v3/calendars/{cal}/events", get(list))).await;
        let events = calendar(&base, "ya29.good")
            .list_events(&EventListQuery::default())
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["summary"], "Standup");
    }

    #[tokio::test]
    async fn test_rejected_token_is_expired_grant() {
        let base = serve(Router::new().route("/calendar/v3/calendars/{cal}/events", get(list))).await;
        let err = calendar(&base, "ya29.revoked")
            .list_events(&EventListQuery::default())
            .await
            .unwrap_err();
        assert!(err.is_expired_grant());
        assert!(matches!(err, BridgeError::Upstream { status: 401, ref body } if body == "Invalid Credentials"));
    }

    #[tokio::test]
    async fn test_create_with_meet() {
        let router = Router::new().route(
            "/calendar/v3/calendars/{cal}/events",
            post(
                |Query(q): Query<HashMap<String, String>>, Json(body): Json<Value>| async move {
                    assert_eq!(q["conferenceDataVersion"], "1");
                    assert_eq!(q["sendUpdates"], "all");
                    let request_id = body["conferenceData"]["createRequest"]["requestId"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string();
                    Json(json!({"id": "new", "requestId": request_id, "attendees": body["attendees"]}))
                },
            ),
        );
        let base = serve(router).await;
        let new: NewEvent = serde_json::from_value(json!({
            "event": {"summary": "Demo"},
            "addMeet": true
        }))
        .unwrap();
        let created = calendar(&base, "ya29.good").create_event(&new).await.unwrap();
        assert!(created["requestId"].as_str().unwrap().starts_with("meet-"));
        assert_eq!(created["attendees"], json!([]));
    }

    #[tokio::test]
    async fn test_ids_are_path_encoded() {
        let router = Router::new().route(
            "/calendar/v3/calendars/{cal}/events/{id}",
            put(|uri: Uri, Path((cal, id)): Path<(String, String)>| async move {
                assert!(uri.path().contains("%23"));
                Json(json!({"calendar": cal, "id": id}))
            }),
        );
        let base = serve(router).await;
        let updated = calendar(&base, "ya29.good")
            .update_event("en.usa#holiday@group", "ev/1", &CalendarEvent::default())
            .await
            .unwrap();
        assert_eq!(updated["calendar"], "en.usa#holiday@group");
        assert_eq!(updated["id"], "ev/1");
    }

    #[tokio::test]
    async fn test_delete_accepts_no_content() {
        let router = Router::new().route(
            "/calendar/v3/calendars/{cal}/events/{id}",
            axum::routing::delete(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q["sendUpdates"], "all");
                StatusCode::NO_CONTENT
            }),
        );
        let base = serve(router).await;
        calendar(&base, "ya29.good")
            .delete_event("primary", "e1")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_calendar_list_and_free_busy() {
        let router = Router::new()
            .route(
                "/calendar/v3/users/me/calendarList",
                get(|| async { Json(json!({"items": [{"id": "primary"}, {"id": "team"}]})) }),
            )
            .route(
                "/calendar/v3/freeBusy",
                post(|Json(body): Json<Value>| async move {
                    let id = body["items"][0]["id"].as_str().unwrap_or_default();
                    let mut calendars = serde_json::Map::new();
                    calendars.insert(id.to_string(), json!({"busy": []}));
                    Json(json!({"calendars": calendars}))
                }),
            )
            .route(
                "/calendar/v3/calendars/{cal}/events/quickAdd",
                post(|Query(q): Query<HashMap<String, String>>| async move {
                    Json(json!({"summary": q["text"]}))
                }),
            );
        let base = serve(router).await;
        let cal = calendar(&base, "ya29.good");

        assert_eq!(cal.list_calendars().await.unwrap().len(), 2);

        let fb = cal
            .free_busy(&FreeBusyQuery {
                calendars: vec!["primary".into()],
                time_min: "2026-03-01T00:00:00Z".into(),
                time_max: "2026-03-02T00:00:00Z".into(),
            })
            .await
            .unwrap();
        assert!(fb["calendars"]["primary"]["busy"].is_array());

        let added = cal.quick_add("primary", "Lunch tomorrow at noon").await.unwrap();
        assert_eq!(added["summary"], "Lunch tomorrow at noon");
    }
}
