use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::NotifierConfig;
use crate::error::{OcmapError, Result};

/// Alert channel for stage failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, subject: &str, body: &str) -> Result<()>;
}

/// Best-effort send: a failing notifier is logged, never propagated.
pub async fn notify(notifier: &dyn Notifier, subject: &str, body: &str) {
    if let Err(e) = notifier.send(subject, body).await {
        tracing::warn!(subject, error = %e, "notification failed");
    }
}

pub fn from_config(cfg: &NotifierConfig) -> Result<Box<dyn Notifier>> {
    Ok(match cfg {
        NotifierConfig::Log => Box::new(LogNotifier),
        NotifierConfig::Webhook { url } => Box::new(WebhookNotifier::new(url)?),
    })
}

// ---------------------------------------------------------------------------
// LogNotifier
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        tracing::warn!(subject, body, "alert");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WebhookNotifier
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Payload<'a> {
    subject: &'a str,
    body: &'a str,
}

/// POSTs `{"subject": .., "body": ..}` to a fixed URL.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let resp = self
            .http
            .post(&self.url)
            .json(&Payload { subject, body })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(OcmapError::Notify(format!(
                "webhook returned {}",
                resp.status()
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Test support
// ---------------------------------------------------------------------------

#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    pub sent: std::sync::Mutex<Vec<(String, String)>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub(crate) fn subjects(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    pub(crate) fn body_of(&self, prefix: &str) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .find(|(s, _)| s.starts_with(prefix))
            .map(|(_, b)| b.clone())
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn webhook_posts_subject_and_body() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/hook")
            .match_body(Matcher::Json(json!({
                "subject": "[ERROR] step 2 geocoding failed",
                "body": "boom"
            })))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let n = WebhookNotifier::new(format!("{}/hook", server.url())).unwrap();
        n.send("[ERROR] step 2 geocoding failed", "boom").await.unwrap();
        m.assert_async().await;
    }

    #[tokio::test]
    async fn failed_delivery_is_swallowed_by_notify() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/hook")
            .with_status(500)
            .create_async()
            .await;

        let n = WebhookNotifier::new(format!("{}/hook", server.url())).unwrap();
        assert!(matches!(
            n.send("s", "b").await,
            Err(OcmapError::Notify(_))
        ));
        notify(&n, "s", "b").await;
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        let n = from_config(&NotifierConfig::Log).unwrap();
        assert!(n.send("subject", "body").await.is_ok());
    }
}
