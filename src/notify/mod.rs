// Operator notifications
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Best-effort message channel. Callers log failures and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<()>;
}

#[derive(Serialize)]
struct SlackMessage<'a> {
    text: &'a str,
}

/// Posts messages to a Slack incoming webhook
#[derive(Clone)]
pub struct SlackNotifier {
    client: Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&SlackMessage { text: message })
            .send()
            .await
            .context("Failed to reach Slack webhook")?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Slack webhook returned {}: {}", status, body);
        }
        Ok(())
    }
}

/// Writes notifications to the log instead of an external channel
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<()> {
        tracing::info!("🔔 {}", message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_slack_posts_text_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_body(Matcher::Json(serde_json::json!({"text": "BUY KRW-BTC"})))
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let notifier = SlackNotifier::new(format!("{}/hook", server.url())).unwrap();
        notifier.notify("BUY KRW-BTC").await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_slack_non_200_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/hook")
            .with_status(403)
            .with_body("invalid_token")
            .create_async()
            .await;

        let notifier = SlackNotifier::new(format!("{}/hook", server.url())).unwrap();
        let err = notifier.notify("hello").await.unwrap_err();

        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify("hello").await.is_ok());
    }
}
