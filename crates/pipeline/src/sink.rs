use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::warn;
use vigil_core::{Error, Notification, Result, Sink};

const AUTHOR: &str = "vigil";

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    attachments: [Attachment<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Attachment<'a> {
    title: &'a str,
    fallback: &'a str,
    color: &'a str,
    author_name: &'a str,
    text: &'a str,
    footer: &'a str,
    ts: i64,
}

impl<'a> WebhookMessage<'a> {
    fn from_notification(n: &'a Notification) -> Self {
        Self {
            attachments: [Attachment {
                title: &n.title,
                fallback: &n.title,
                color: &n.color,
                author_name: AUTHOR,
                text: &n.text,
                footer: &n.footer,
                ts: n.ts,
            }],
        }
    }
}

/// Posts notifications to a Slack incoming webhook as a single attachment.
pub struct SlackWebhookSink {
    client: Client,
    url: String,
}

impl SlackWebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Delivery(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl Sink for SlackWebhookSink {
    async fn deliver(&self, message: &Notification) -> Result<()> {
        let body = WebhookMessage::from_notification(message);
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Delivery(format!("webhook request: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%status, body = %text, "webhook rejected notification");
            return Err(Error::Delivery(format!("webhook returned {}: {}", status, text)));
        }
        Ok(())
    }
}
