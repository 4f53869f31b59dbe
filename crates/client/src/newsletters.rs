//! `/api/newsletters/*`.

use mailbridge_types::traits::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    emails::Page,
    http::{ApiClient, RequestOptions},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Newsletter {
    pub id: i64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewsletterCreate {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

pub struct NewslettersApi<'a> {
    client: &'a ApiClient,
}

impl ApiClient {
    #[must_use]
    pub fn newsletters(&self) -> NewslettersApi<'_> {
        NewslettersApi { client: self }
    }
}

impl NewslettersApi<'_> {
    /// # Errors
    ///
    /// Returns the backend's error if the list cannot be read.
    pub async fn list(&self, page: Page) -> Result<Vec<Newsletter>> {
        self.client
            .request_as(
                &format!("/api/newsletters/?{}", page.query()),
                RequestOptions::get(),
            )
            .await
    }

    /// # Errors
    ///
    /// Returns the backend's error (e.g. "Not found").
    pub async fn get(&self, id: i64) -> Result<Newsletter> {
        self.client
            .request_as(&format!("/api/newsletters/{id}"), RequestOptions::get())
            .await
    }

    /// Create and send a newsletter.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if sending is rejected.
    pub async fn send(&self, newsletter: &NewsletterCreate) -> Result<Newsletter> {
        self.client
            .request_as(
                "/api/newsletters/send",
                RequestOptions::post(Some(serde_json::to_value(newsletter)?)),
            )
            .await
    }

    /// # Errors
    ///
    /// Returns the backend's error if the delete is rejected.
    pub async fn delete(&self, id: i64) -> Result<Value> {
        self.client
            .request(&format!("/api/newsletters/{id}"), RequestOptions::delete())
            .await
    }
}
