use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Base URL for the authenticated user's Gmail resources
pub const GMAIL_BASE_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Summary entry returned by `messages.list`
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageRef {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

/// A full message as returned by `messages.get?format=full`
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub label_ids: Vec<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub payload: Option<MessagePart>,
}

/// One node of a message's MIME tree
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub part_id: Option<String>,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<MessagePartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessagePartBody {
    #[serde(default)]
    pub attachment_id: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    /// base64url encoded content
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Label {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type")]
    pub label_type: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ListLabelsResponse {
    #[serde(default)]
    labels: Vec<Label>,
}

/// Label changes applied by `messages.modify`
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModifyRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub add_label_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remove_label_ids: Vec<String>,
}

impl ModifyRequest {
    pub fn add(label_id: &str) -> Self {
        Self {
            add_label_ids: vec![label_id.to_string()],
            ..Self::default()
        }
    }

    pub fn remove(label_id: &str) -> Self {
        Self {
            remove_label_ids: vec![label_id.to_string()],
            ..Self::default()
        }
    }
}

/// The subset of the Gmail API the commands rely on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailApi: Send + Sync {
    async fn list_messages(
        &self,
        query: Option<String>,
        max_results: u32,
    ) -> Result<Vec<MessageRef>>;
    async fn get_message(&self, id: &str) -> Result<Message>;
    /// Send an RFC 2822 message, already base64url encoded
    async fn send_message(&self, raw: String) -> Result<Message>;
    async fn modify_message(&self, id: &str, request: ModifyRequest) -> Result<()>;
    async fn trash_message(&self, id: &str) -> Result<()>;
    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<MessagePartBody>;
    async fn list_labels(&self) -> Result<Vec<Label>>;
    async fn create_label(&self, name: &str) -> Result<Label>;
}

/// Client for interacting with the Gmail REST API
pub struct GmailClient {
    client: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl GmailClient {
    /// Create a new Gmail client with the given access token
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, GMAIL_BASE_URL)
    }

    pub fn with_base_url(access_token: String, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            access_token,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Send a request and turn non-2xx responses into errors carrying the body
    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Request to Gmail failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not get error details".to_string());
            anyhow::bail!("Gmail API returned HTTP {}: {}", status, error_text);
        }

        Ok(response)
    }
}

#[async_trait]
impl MailApi for GmailClient {
    async fn list_messages(
        &self,
        query: Option<String>,
        max_results: u32,
    ) -> Result<Vec<MessageRef>> {
        let mut params = vec![("maxResults", max_results.to_string())];
        if let Some(q) = query.filter(|q| !q.is_empty()) {
            params.push(("q", q));
        }

        tracing::debug!(?params, "Listing messages");
        let response = self
            .execute(self.client.get(self.url("messages")).query(&params))
            .await?;
        let list: ListMessagesResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse message list: {}", e))?;
        Ok(list.messages)
    }

    async fn get_message(&self, id: &str) -> Result<Message> {
        tracing::debug!(id, "Fetching message");
        let response = self
            .execute(
                self.client
                    .get(self.url(&format!("messages/{}", id)))
                    .query(&[("format", "full")]),
            )
            .await?;
        let message: Message = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse message {}: {}", id, e))?;
        Ok(message)
    }

    async fn send_message(&self, raw: String) -> Result<Message> {
        let payload = serde_json::json!({ "raw": raw });
        let response = self
            .execute(self.client.post(self.url("messages/send")).json(&payload))
            .await?;
        let message: Message = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse send response: {}", e))?;
        Ok(message)
    }

    async fn modify_message(&self, id: &str, request: ModifyRequest) -> Result<()> {
        tracing::debug!(id, ?request, "Modifying message labels");
        self.execute(
            self.client
                .post(self.url(&format!("messages/{}/modify", id)))
                .json(&request),
        )
        .await?;
        Ok(())
    }

    async fn trash_message(&self, id: &str) -> Result<()> {
        self.execute(self.client.post(self.url(&format!("messages/{}/trash", id))))
            .await?;
        Ok(())
    }

    async fn get_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<MessagePartBody> {
        let response = self
            .execute(self.client.get(self.url(&format!(
                "messages/{}/attachments/{}",
                message_id, attachment_id
            ))))
            .await?;
        let body: MessagePartBody = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse attachment response: {}", e))?;
        Ok(body)
    }

    async fn list_labels(&self) -> Result<Vec<Label>> {
        let response = self.execute(self.client.get(self.url("labels"))).await?;
        let list: ListLabelsResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse label list: {}", e))?;
        Ok(list.labels)
    }

    async fn create_label(&self, name: &str) -> Result<Label> {
        let payload = serde_json::json!({ "name": name });
        let response = self
            .execute(self.client.post(self.url("labels")).json(&payload))
            .await?;
        let label: Label = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse created label: {}", e))?;
        Ok(label)
    }
}
