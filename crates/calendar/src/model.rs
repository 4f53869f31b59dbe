//! Request shapes for calendar operations.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::PRIMARY;

/// Default `maxResults` for event listings.
pub const DEFAULT_MAX_RESULTS: u32 = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    /// All-day events carry a date instead of a date-time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_status: Option<String>,
}

/// An event as sent to Google. Fields not modelled here (reminders,
/// recurrence, colour...) are kept in `extra` and forwarded untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
    #[serde(default)]
    pub attendees: Vec<Attendee>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CalendarEvent {
    /// The insert body, with a Meet conference request when `request_id`
    /// is given.
    #[must_use]
    pub fn to_insert_body(&self, request_id: Option<&str>) -> Value {
        let mut body = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        if let (Some(id), Some(obj)) = (request_id, body.as_object_mut()) {
            obj.insert(
                "conferenceData".into(),
                json!({
                    "createRequest": {
                        "requestId": id,
                        "conferenceSolutionKey": { "type": "hangoutsMeet" }
                    }
                }),
            );
        }
        body
    }
}

/// A unique Meet conference request id: `meet-<unix millis>-<suffix>`.
#[must_use]
pub fn conference_request_id() -> String {
    format!(
        "meet-{}-{}",
        Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4().simple()
    )
}

/// Current time in the RFC 3339 form Google accepts for `timeMin`.
#[must_use]
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Filters for listing events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventListQuery {
    pub calendar_id: String,
    pub time_min: Option<String>,
    pub time_max: Option<String>,
    pub max_results: u32,
}

impl Default for EventListQuery {
    fn default() -> Self {
        Self {
            calendar_id: PRIMARY.to_string(),
            time_min: None,
            time_max: None,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl EventListQuery {
    /// Query parameters for `events.list`. `timeMin` defaults to now and
    /// `timeMax` is only sent when non-empty.
    #[must_use]
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let time_min = self
            .time_min
            .as_deref()
            .filter(|s| !s.is_empty())
            .map_or_else(now_rfc3339, str::to_string);
        let mut params = vec![
            ("timeMin", time_min),
            ("maxResults", self.max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(max) = self.time_max.as_deref().filter(|s| !s.is_empty()) {
            params.push(("timeMax", max.to_string()));
        }
        params
    }
}

/// Body of `POST /api/calendar`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub event: CalendarEvent,
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub add_meet: bool,
}

impl NewEvent {
    #[must_use]
    pub fn calendar_id(&self) -> &str {
        self.calendar_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(PRIMARY)
    }
}

/// Body of `POST /api/calendar/freebusy`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreeBusyQuery {
    pub calendars: Vec<String>,
    pub time_min: String,
    pub time_max: String,
}

impl FreeBusyQuery {
    #[must_use]
    pub fn to_request_body(&self) -> Value {
        let items: Vec<Value> = self.calendars.iter().map(|id| json!({ "id": id })).collect();
        json!({
            "timeMin": self.time_min,
            "timeMax": self.time_max,
            "items": items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param<'a>(params: &'a [(&str, String)], key: &str) -> Option<&'a str> {
        params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_list_params_defaults() {
        let params = EventListQuery {
            time_max: Some(String::new()),
            ..EventListQuery::default()
        }
        .params();
        let time_min = param(&params, "timeMin").unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(time_min).is_ok());
        assert_eq!(param(&params, "maxResults"), Some("50"));
        assert_eq!(param(&params, "singleEvents"), Some("true"));
        assert_eq!(param(&params, "orderBy"), Some("startTime"));
        assert_eq!(param(&params, "timeMax"), None);
    }

    #[test]
    fn test_list_params_explicit_window() {
        let params = EventListQuery {
            time_min: Some("2026-03-01T00:00:00Z".into()),
            time_max: Some("2026-03-08T00:00:00Z".into()),
            max_results: 10,
            ..EventListQuery::default()
        }
        .params();
        assert_eq!(param(&params, "timeMin"), Some("2026-03-01T00:00:00Z"));
        assert_eq!(param(&params, "timeMax"), Some("2026-03-08T00:00:00Z"));
        assert_eq!(param(&params, "maxResults"), Some("10"));
    }

    #[test]
    fn test_event_defaults_attendees_and_keeps_extras() {
        let event: CalendarEvent = serde_json::from_value(json!({
            "summary": "Sync",
            "start": {"dateTime": "2026-03-01T10:00:00Z"},
            "end": {"dateTime": "2026-03-01T10:30:00Z", "timeZone": "UTC"},
            "reminders": {"useDefault": true}
        }))
        .unwrap();
        assert!(event.attendees.is_empty());

        let body = event.to_insert_body(None);
        assert_eq!(body["attendees"], json!([]));
        assert_eq!(body["reminders"]["useDefault"], true);
        assert_eq!(body["end"]["timeZone"], "UTC");
        assert!(body.get("description").is_none());
        assert!(body.get("conferenceData").is_none());
    }

    #[test]
    fn test_insert_body_with_meet() {
        let body = CalendarEvent::default().to_insert_body(Some("meet-1-abc"));
        let req = &body["conferenceData"]["createRequest"];
        assert_eq!(req["requestId"], "meet-1-abc");
        assert_eq!(req["conferenceSolutionKey"]["type"], "hangoutsMeet");
    }

    #[test]
    fn test_conference_request_ids_are_unique() {
        let a = conference_request_id();
        let b = conference_request_id();
        assert!(a.starts_with("meet-"));
        assert_eq!(a.split('-').count(), 3);
        assert_ne!(a, b);
    }

    #[test]
    fn test_new_event_calendar_default() {
        let new: NewEvent = serde_json::from_value(json!({"event": {}})).unwrap();
        assert_eq!(new.calendar_id(), "primary");
        assert!(!new.add_meet);

        let new: NewEvent =
            serde_json::from_value(json!({"event": {}, "calendarId": "team", "addMeet": true}))
                .unwrap();
        assert_eq!(new.calendar_id(), "team");
        assert!(new.add_meet);
    }

    #[test]
    fn test_free_busy_body() {
        let q: FreeBusyQuery = serde_json::from_value(json!({
            "calendars": ["primary", "team@example.com"],
            "timeMin": "2026-03-01T00:00:00Z",
            "timeMax": "2026-03-02T00:00:00Z"
        }))
        .unwrap();
        let body = q.to_request_body();
        assert_eq!(body["items"][1]["id"], "team@example.com");
        assert_eq!(body["timeMax"], "2026-03-02T00:00:00Z");
    }
}
