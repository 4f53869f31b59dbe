//! Google Calendar access on behalf of one caller.
//!
//! A [`CalendarClient`] is built per request from a
//! [`GoogleOAuthClient`](mailbridge_auth::GoogleOAuthClient) by a
//! [`CalendarClientFactory`]; nothing here caches clients or tokens.
//! Event payloads are passed through as JSON so fields Google adds later
//! survive the round trip.

pub mod google;
pub mod model;

pub use google::{GoogleCalendarClient, GoogleCalendarFactory};
pub use model::{Attendee, CalendarEvent, EventListQuery, EventTime, FreeBusyQuery, NewEvent};

use async_trait::async_trait;
use mailbridge_auth::GoogleOAuthClient;
use mailbridge_types::traits::Result;
use serde_json::Value;

/// Calendar used when a request names none.
pub const PRIMARY: &str = "primary";

/// Calendar operations the proxy exposes.
///
/// Upstream failures surface as [`BridgeError::Upstream`] carrying Google's
/// `error.message` (or the raw body), so callers can classify revoked
/// grants with [`BridgeError::is_expired_grant`].
///
/// [`BridgeError::Upstream`]: mailbridge_types::BridgeError::Upstream
/// [`BridgeError::is_expired_grant`]: mailbridge_types::BridgeError::is_expired_grant
#[async_trait]
pub trait CalendarClient: Send + Sync {
    /// Single (expanded) events ordered by start time.
    async fn list_events(&self, query: &EventListQuery) -> Result<Vec<Value>>;

    /// Insert an event, optionally requesting a Meet conference.
    async fn create_event(&self, new: &NewEvent) -> Result<Value>;

    /// Calendars on the caller's calendar list.
    async fn list_calendars(&self) -> Result<Vec<Value>>;

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Value>;

    /// Replace an event; attendees are notified.
    async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        event: &CalendarEvent,
    ) -> Result<Value>;

    /// Delete an event; attendees are notified.
    async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<()>;

    /// Create an event from a natural-language description.
    async fn quick_add(&self, calendar_id: &str, text: &str) -> Result<Value>;

    async fn free_busy(&self, query: &FreeBusyQuery) -> Result<Value>;
}

/// Builds a [`CalendarClient`] for one caller's credentials.
pub trait CalendarClientFactory: Send + Sync {
    fn build(&self, oauth: GoogleOAuthClient) -> Box<dyn CalendarClient>;
}
