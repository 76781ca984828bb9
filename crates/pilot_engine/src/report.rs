//! Fire-and-forget notification of confirmed publishes.

use std::time::Duration;

use chrono::{DateTime, Utc};
use pilot_core::PublishDetection;
use pilot_logging::{pilot_info, pilot_warn};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedArticle {
    pub id: String,
    pub title: String,
    pub url: String,
    pub status: String,
    pub publish_time: DateTime<Utc>,
    #[serde(default)]
    pub extra: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReport {
    pub platform: String,
    pub account: String,
    pub articles: Vec<ReportedArticle>,
}

impl PublishReport {
    pub fn from_detection(detection: &PublishDetection, account: &str) -> Self {
        Self {
            platform: detection.platform.clone(),
            account: account.to_string(),
            articles: vec![ReportedArticle {
                id: article_id(&detection.url),
                title: detection.title.clone(),
                url: detection.url.clone(),
                status: detection.status.clone(),
                publish_time: detection.detected_at,
                extra: serde_json::json!({ "trigger": detection.trigger }),
            }],
        }
    }
}

/// Stable short id for a published URL: first 8 bytes of its SHA-256, hex.
pub fn article_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

/// Receives one report per confirmed publish. Delivery failures are the
/// sink's problem; callers never see them.
#[async_trait::async_trait]
pub trait ReportSink: Send + Sync {
    async fn report(&self, report: PublishReport);
}

pub struct HttpReportSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReportSink {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait::async_trait]
impl ReportSink for HttpReportSink {
    async fn report(&self, report: PublishReport) {
        let body = match serde_json::to_vec(&report) {
            Ok(body) => body,
            Err(err) => {
                pilot_warn!("could not encode publish report: {}", err);
                return;
            }
        };
        let sent = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;
        match sent {
            Ok(response) if response.status().is_success() => {
                pilot_info!("reported {} publish to {}", report.platform, self.endpoint);
            }
            Ok(response) => {
                pilot_warn!("publish report rejected with {}", response.status());
            }
            Err(err) => pilot_warn!("publish report not delivered: {}", err),
        }
    }
}

/// In-process sink, for hosts that forward reports themselves.
pub struct ChannelReportSink {
    tx: mpsc::UnboundedSender<PublishReport>,
}

impl ChannelReportSink {
    pub fn new(tx: mpsc::UnboundedSender<PublishReport>) -> Self {
        Self { tx }
    }
}

#[async_trait::async_trait]
impl ReportSink for ChannelReportSink {
    async fn report(&self, report: PublishReport) {
        let _ = self.tx.send(report);
    }
}
