//! `/api/emails/*`: sending, folders, and per-message state changes.

use mailbridge_types::{BridgeError, traits::Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::http::{ApiClient, RequestOptions};

/// Body used when a message is sent without one.
pub const EMPTY_BODY: &str = "<p></p>";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Email {
    pub id: i64,
    pub subject: String,
    pub body: String,
    pub recipient: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_email: Option<String>,
    #[serde(default)]
    pub is_sent: bool,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailCreate {
    pub subject: String,
    pub body: String,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_draft: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EmailUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_archived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_deleted: Option<bool>,
}

/// Unvalidated compose-form input.
#[derive(Debug, Clone, Default)]
pub struct EmailDraft {
    pub recipient: String,
    pub subject: String,
    pub body: String,
}

impl EmailDraft {
    /// Check the draft before any network call.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Validation`] if the recipient or subject is
    /// blank.
    pub fn validate(self) -> Result<EmailCreate> {
        if self.recipient.trim().is_empty() || self.subject.trim().is_empty() {
            return Err(BridgeError::Validation(
                "Please fill in recipient and subject".into(),
            ));
        }
        let body = if self.body.is_empty() {
            EMPTY_BODY.to_string()
        } else {
            self.body
        };
        Ok(EmailCreate {
            subject: self.subject,
            body,
            recipient: self.recipient,
            is_draft: None,
        })
    }
}

/// Mail folders listed through `/api/emails/<folder>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Folder {
    Inbox,
    Sent,
    Drafts,
    Archived,
    Trash,
}

impl Folder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
            Self::Drafts => "drafts",
            Self::Archived => "archived",
            Self::Trash => "trash",
        }
    }
}

impl std::str::FromStr for Folder {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "inbox" => Ok(Self::Inbox),
            "sent" => Ok(Self::Sent),
            "drafts" => Ok(Self::Drafts),
            "archived" => Ok(Self::Archived),
            "trash" => Ok(Self::Trash),
            other => Err(BridgeError::Validation(format!("unknown folder: {other}"))),
        }
    }
}

/// `skip` / `limit` pagination; defaults to the first 50.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: u32,
    pub limit: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { skip: 0, limit: 50 }
    }
}

impl Page {
    #[must_use]
    pub fn query(self) -> String {
        format!("skip={}&limit={}", self.skip, self.limit)
    }
}

pub struct EmailsApi<'a> {
    client: &'a ApiClient,
}

impl ApiClient {
    #[must_use]
    pub fn emails(&self) -> EmailsApi<'_> {
        EmailsApi { client: self }
    }
}

impl EmailsApi<'_> {
    /// # Errors
    ///
    /// Returns the backend's error for a rejected message.
    pub async fn send(&self, email: &EmailCreate) -> Result<Email> {
        self.client
            .request_as(
                "/api/emails/send",
                RequestOptions::post(Some(serde_json::to_value(email)?)),
            )
            .await
    }

    /// Validate a compose-form draft, then send it.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Validation`] without a network call for an
    /// incomplete draft, otherwise as for [`send`](Self::send).
    pub async fn compose(&self, draft: EmailDraft) -> Result<Email> {
        let email = draft.validate()?;
        self.send(&email).await
    }

    /// # Errors
    ///
    /// Returns the backend's error if the folder cannot be listed.
    pub async fn list(&self, folder: Folder, page: Page) -> Result<Vec<Email>> {
        self.client
            .request_as(
                &format!("/api/emails/{}?{}", folder.as_str(), page.query()),
                RequestOptions::get(),
            )
            .await
    }

    /// # Errors
    ///
    /// Returns the backend's error (e.g. "Not found").
    pub async fn get(&self, id: i64) -> Result<Email> {
        self.client
            .request_as(&format!("/api/emails/{id}"), RequestOptions::get())
            .await
    }

    /// # Errors
    ///
    /// Returns the backend's error if the update is rejected.
    pub async fn update(&self, id: i64, update: &EmailUpdate) -> Result<Email> {
        self.client
            .request_as(
                &format!("/api/emails/{id}"),
                RequestOptions::patch(serde_json::to_value(update)?),
            )
            .await
    }

    /// Permanently delete a message.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if the delete is rejected.
    pub async fn delete(&self, id: i64) -> Result<Value> {
        self.client
            .request(&format!("/api/emails/{id}"), RequestOptions::delete())
            .await
    }

    /// # Errors
    ///
    /// Returns the backend's error if the message cannot be archived.
    pub async fn archive(&self, id: i64) -> Result<Email> {
        self.action(id, "archive").await
    }

    /// # Errors
    ///
    /// Returns the backend's error if the message cannot be trashed.
    pub async fn move_to_trash(&self, id: i64) -> Result<Email> {
        self.action(id, "trash").await
    }

    /// # Errors
    ///
    /// Returns the backend's error if the message cannot be restored.
    pub async fn restore(&self, id: i64) -> Result<Email> {
        self.action(id, "restore").await
    }

    async fn action(&self, id: i64, action: &str) -> Result<Email> {
        self.client
            .request_as(
                &format!("/api/emails/{id}/{action}"),
                RequestOptions::post(None),
            )
            .await
    }
}
