//! `/api/ai/*` writing helpers. Model behaviour is the service's concern;
//! this module only shapes requests and responses.

use mailbridge_types::traits::Result;
use serde::{Deserialize, Serialize};

use crate::http::{ApiClient, RequestOptions};

#[derive(Debug, Clone, Serialize)]
pub struct ComposeRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImproveRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
}

/// Body shared by the subject-line, summary and smart-reply endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct EmailBodyRequest {
    pub email_body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectLines {
    pub subject_lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replies {
    pub replies: Vec<String>,
}

pub struct AiApi<'a> {
    client: &'a ApiClient,
}

impl ApiClient {
    /// AI helpers. Point the client at the AI service with
    /// [`ApiClient::rebased`] when it is not co-hosted with the backend.
    #[must_use]
    pub fn ai(&self) -> AiApi<'_> {
        AiApi { client: self }
    }
}

impl AiApi<'_> {
    async fn post<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.client
            .request_as(path, RequestOptions::post(Some(serde_json::to_value(body)?)))
            .await
    }

    /// Draft an email from a prompt.
    ///
    /// # Errors
    ///
    /// Returns the service's error.
    pub async fn compose(&self, req: &ComposeRequest) -> Result<Content> {
        self.post("/api/ai/compose", req).await
    }

    /// # Errors
    ///
    /// Returns the service's error.
    pub async fn improve(&self, req: &ImproveRequest) -> Result<Content> {
        self.post("/api/ai/improve", req).await
    }

    /// # Errors
    ///
    /// Returns the service's error.
    pub async fn subject_lines(&self, req: &EmailBodyRequest) -> Result<SubjectLines> {
        self.post("/api/ai/subject-lines", req).await
    }

    /// # Errors
    ///
    /// Returns the service's error.
    pub async fn summarize(&self, email_body: &str) -> Result<Summary> {
        let req = EmailBodyRequest {
            email_body: email_body.to_string(),
            count: None,
        };
        self.post("/api/ai/summarize", &req).await
    }

    /// # Errors
    ///
    /// Returns the service's error.
    pub async fn smart_replies(&self, req: &EmailBodyRequest) -> Result<Replies> {
        self.post("/api/ai/smart-replies", req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::tests::{client, serve};
    use axum::{Json, Router, routing::post};
    use serde_json::{Value, json};

    #[tokio::test]
    async fn test_endpoints_and_bodies() {
        let router = Router::new()
            .route(
                "/api/ai/compose",
                post(|Json(b): Json<Value>| async move {
                    assert_eq!(b, json!({"prompt": "thank the team"}));
                    Json(json!({"content": "<p>Thanks!</p>"}))
                }),
            )
            .route(
                "/api/ai/subject-lines",
                post(|Json(b): Json<Value>| async move {
                    assert_eq!(b["count"], 2);
                    Json(json!({"subject_lines": ["A", "B"]}))
                }),
            )
            .route(
                "/api/ai/summarize",
                post(|Json(b): Json<Value>| async move {
                    assert!(b.get("count").is_none());
                    Json(json!({"summary": "short"}))
                }),
            );
        let c = client(&serve(router).await);
        let ai = c.ai();

        let drafted = ai
            .compose(&ComposeRequest {
                prompt: "thank the team".into(),
                tone: None,
            })
            .await
            .unwrap();
        assert_eq!(drafted.content, "<p>Thanks!</p>");

        let lines = ai
            .subject_lines(&EmailBodyRequest {
                email_body: "body".into(),
                count: Some(2),
            })
            .await
            .unwrap();
        assert_eq!(lines.subject_lines, vec!["A", "B"]);

        assert_eq!(ai.summarize("long text").await.unwrap().summary, "short");
    }
}
