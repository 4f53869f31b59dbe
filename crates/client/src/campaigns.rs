//! Outreach campaigns and their leads.

use mailbridge_types::{BridgeError, traits::Result};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::http::{ApiClient, RequestOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Running,
    Paused,
    Completed,
}

impl CampaignStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

impl std::str::FromStr for CampaignStatus {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            other => Err(BridgeError::Validation(format!(
                "unknown campaign status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: CampaignStatus,
    #[serde(default)]
    pub total_leads: u64,
    #[serde(default)]
    pub sent_count: u64,
    #[serde(default)]
    pub open_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub bounce_count: u64,
    #[serde(default)]
    pub open_rate: f64,
    #[serde(default)]
    pub reply_rate: f64,
    #[serde(default)]
    pub bounce_rate: f64,
    pub subject_template: Option<String>,
    pub body_template: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CampaignCreate {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_template: Option<String>,
}

impl CampaignCreate {
    /// # Errors
    ///
    /// Returns [`BridgeError::Validation`] for a blank name.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(BridgeError::Validation("Campaign name is required".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

pub struct CampaignsApi<'a> {
    client: &'a ApiClient,
}

impl ApiClient {
    #[must_use]
    pub fn campaigns(&self) -> CampaignsApi<'_> {
        CampaignsApi { client: self }
    }
}

/// `/api/campaigns/<id>` followed by `tail`, with the id encoded as a single
/// path segment.
fn campaign_path(id: &str, tail: &str) -> String {
    format!("/api/campaigns/{}{tail}", urlencoding::encode(id))
}

fn with_status(path: String, status: Option<&str>) -> Result<String> {
    match status {
        Some(s) if !s.is_empty() => {
            let query = serde_urlencoded::to_string([("status", s)])
                .map_err(|e| BridgeError::Validation(format!("invalid status filter: {e}")))?;
            Ok(format!("{path}?{query}"))
        }
        _ => Ok(path),
    }
}

impl CampaignsApi<'_> {
    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.client.require_token().await?;
        self.client.request_as(path, options).await
    }

    /// # Errors
    ///
    /// `Unauthenticated` without a cached token, otherwise the backend's
    /// error or "Failed to fetch campaigns".
    pub async fn list(&self, status: Option<&str>) -> Result<Vec<Campaign>> {
        self.call(
            &with_status("/api/campaigns".into(), status)?,
            RequestOptions::get().fallback("Failed to fetch campaigns"),
        )
        .await
    }

    /// # Errors
    ///
    /// `Unauthenticated` without a cached token, otherwise the backend's
    /// error or "Campaign not found".
    pub async fn get(&self, id: &str) -> Result<Campaign> {
        self.call(
            &campaign_path(id, ""),
            RequestOptions::get().fallback("Campaign not found"),
        )
        .await
    }

    /// # Errors
    ///
    /// `Validation` for a blank name (before any network call), otherwise
    /// as for the other operations with "Failed to create campaign".
    pub async fn create(&self, campaign: &CampaignCreate) -> Result<Campaign> {
        campaign.validate()?;
        self.call(
            "/api/campaigns",
            RequestOptions::post(Some(serde_json::to_value(campaign)?))
                .fallback("Failed to create campaign"),
        )
        .await
    }

    /// # Errors
    ///
    /// The backend's error or "Failed to update campaign".
    pub async fn update_status(&self, id: &str, status: CampaignStatus) -> Result<Campaign> {
        self.call(
            &campaign_path(id, ""),
            RequestOptions::patch(json!({ "status": status.as_str() }))
                .fallback("Failed to update campaign"),
        )
        .await
    }

    /// # Errors
    ///
    /// The backend's error or "Failed to start campaign".
    pub async fn start(&self, id: &str) -> Result<Campaign> {
        self.call(
            &campaign_path(id, "/start"),
            RequestOptions::post(None).fallback("Failed to start campaign"),
        )
        .await
    }

    /// # Errors
    ///
    /// The backend's error or "Failed to pause campaign".
    pub async fn pause(&self, id: &str) -> Result<Campaign> {
        self.call(
            &campaign_path(id, "/pause"),
            RequestOptions::post(None).fallback("Failed to pause campaign"),
        )
        .await
    }

    /// # Errors
    ///
    /// The backend's error or "Failed to stop campaign".
    pub async fn stop(&self, id: &str) -> Result<Campaign> {
        self.call(
            &campaign_path(id, "/stop"),
            RequestOptions::post(None).fallback("Failed to stop campaign"),
        )
        .await
    }

    /// # Errors
    ///
    /// The backend's error or "Failed to delete campaign".
    pub async fn delete(&self, id: &str) -> Result<()> {
        let _: Value = self
            .call(
                &campaign_path(id, ""),
                RequestOptions::delete().fallback("Failed to delete campaign"),
            )
            .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// The backend's error or "Failed to add leads".
    pub async fn add_leads(&self, id: &str, leads: &[Lead]) -> Result<Vec<Value>> {
        self.call(
            &campaign_path(id, "/leads"),
            RequestOptions::post(Some(json!({ "leads": leads }))).fallback("Failed to add leads"),
        )
        .await
    }

    /// # Errors
    ///
    /// The backend's error or "Failed to fetch leads".
    pub async fn leads(&self, id: &str, status: Option<&str>) -> Result<Vec<Value>> {
        self.call(
            &with_status(campaign_path(id, "/leads"), status)?,
            RequestOptions::get().fallback("Failed to fetch leads"),
        )
        .await
    }
}
