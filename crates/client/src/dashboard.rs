//! Outreach dashboard figures and the agent activity feed.

use mailbridge_types::traits::Result;
use serde::{Deserialize, Serialize};

use crate::http::{ApiClient, RequestOptions};

/// Default page size for the activity feed.
pub const DEFAULT_ACTIVITY_LIMIT: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Neutral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub emails_sent_today: u64,
    pub emails_sent_week: u64,
    pub emails_sent_total: u64,
    pub reply_rate: f64,
    pub reply_rate_trend: Trend,
    pub reply_rate_change: f64,
    pub meetings_booked: u64,
    pub meetings_booked_trend: Trend,
    pub meetings_booked_change: f64,
    pub active_leads: u64,
    pub active_leads_trend: Trend,
    pub active_leads_change: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentActivity {
    pub id: String,
    pub user_id: String,
    pub campaign_id: Option<String>,
    pub activity_type: String,
    pub description: Option<String>,
    pub recipient_email: Option<String>,
    pub recipient_name: Option<String>,
    pub campaign_name: Option<String>,
    pub created_at: String,
}

/// Campaign counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignsSummary {
    pub total: u64,
    pub running: u64,
    pub paused: u64,
    pub completed: u64,
    pub draft: u64,
}

pub struct DashboardApi<'a> {
    client: &'a ApiClient,
}

impl ApiClient {
    #[must_use]
    pub fn dashboard(&self) -> DashboardApi<'_> {
        DashboardApi { client: self }
    }
}

impl DashboardApi<'_> {
    /// # Errors
    ///
    /// `Unauthenticated` without a cached token, otherwise the backend's
    /// error or "Failed to fetch stats".
    pub async fn stats(&self) -> Result<DashboardStats> {
        self.client.require_token().await?;
        self.client
            .request_as(
                "/api/dashboard/stats",
                RequestOptions::get().fallback("Failed to fetch stats"),
            )
            .await
    }

    /// # Errors
    ///
    /// `Unauthenticated` without a cached token, otherwise the backend's
    /// error or "Failed to fetch activities".
    pub async fn activities(&self, limit: u32) -> Result<Vec<AgentActivity>> {
        self.client.require_token().await?;
        self.client
            .request_as(
                &format!("/api/dashboard/activities?limit={limit}"),
                RequestOptions::get().fallback("Failed to fetch activities"),
            )
            .await
    }

    /// # Errors
    ///
    /// `Unauthenticated` without a cached token, otherwise the backend's
    /// error or "Failed to fetch summary".
    pub async fn campaigns_summary(&self) -> Result<CampaignsSummary> {
        self.client.require_token().await?;
        self.client
            .request_as(
                "/api/dashboard/campaigns/summary",
                RequestOptions::get().fallback("Failed to fetch summary"),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::{client, serve};
    use axum::{Json, Router, extract::RawQuery, http::StatusCode, routing::get};
    use mailbridge_types::OAuthToken;
    use serde_json::json;

    #[tokio::test]
    async fn test_requires_token_before_network() {
        let c = client("http://127.0.0.1:9");
        let err = c.dashboard().stats().await.unwrap_err();
        assert!(err.is_unauthenticated());
        assert_eq!(err.to_string(), "Not authenticated");
    }

    #[tokio::test]
    async fn test_stats_and_summary() {
        let router = Router::new()
            .route(
                "/api/dashboard/stats",
                get(|| async {
                    Json(json!({
                        "emails_sent_today": 3, "emails_sent_week": 20, "emails_sent_total": 400,
                        "reply_rate": 12.5, "reply_rate_trend": "up", "reply_rate_change": 1.5,
                        "meetings_booked": 2, "meetings_booked_trend": "neutral", "meetings_booked_change": 0.0,
                        "active_leads": 40, "active_leads_trend": "down", "active_leads_change": -3.0
                    }))
                }),
            )
            .route(
                "/api/dashboard/campaigns/summary",
                get(|| async {
                    Json(json!({"total": 4, "running": 1, "paused": 1, "completed": 1, "draft": 1}))
                }),
            );
        let c = client(&serve(router).await);
        c.set_token(&OAuthToken::new("jwt")).await.unwrap();

        let stats = c.dashboard().stats().await.unwrap();
        assert_eq!(stats.reply_rate_trend, Trend::Up);
        assert_eq!(stats.active_leads_trend, Trend::Down);
        assert_eq!(c.dashboard().campaigns_summary().await.unwrap().total, 4);
    }

    #[tokio::test]
    async fn test_activities_limit_and_fallback() {
        let router = Router::new().route(
            "/api/dashboard/activities",
            get(|RawQuery(q): RawQuery| async move {
                assert_eq!(q.as_deref(), Some("limit=50"));
                (StatusCode::INTERNAL_SERVER_ERROR, "boom")
            }),
        );
        let c = client(&serve(router).await);
        c.set_token(&OAuthToken::new("jwt")).await.unwrap();
        let err = c
            .dashboard()
            .activities(DEFAULT_ACTIVITY_LIMIT)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Failed to fetch activities");
    }
}
