//! Downloads the page an article is being written from.

use std::time::Duration;

use futures_util::StreamExt;
use pilot_logging::{pilot_debug, pilot_info};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{FetchError, FetchedPage};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    /// Media types treated as article pages. A response without a
    /// `Content-Type` is let through and sniffed by the decoder.
    pub article_types: Vec<String>,
    pub user_agent: String,
    pub accept_language: String,
    /// Extra attempts after a transient failure.
    pub retries: u32,
    #[serde(with = "duration_millis")]
    pub retry_backoff: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            article_types: vec!["text/html".into(), "application/xhtml+xml".into()],
            user_agent: concat!("publish-pilot/", env!("CARGO_PKG_VERSION")).into(),
            accept_language: "zh-CN,zh;q=0.9,en;q=0.8".into(),
            retries: 1,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Source-page download. Implementations must give up promptly once
/// `cancel` fires.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, cancel: &CancellationToken)
        -> Result<FetchedPage, FetchError>;
}

pub struct ReqwestFetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl ReqwestFetcher {
    pub fn new(settings: FetchSettings) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml;q=0.9,*/*;q=0.5"),
        );
        if let Ok(value) = HeaderValue::from_str(&settings.accept_language) {
            headers.insert(ACCEPT_LANGUAGE, value);
        }
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .default_headers(headers)
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .build()
            .map_err(|err| FetchError::Network(err.to_string()))?;
        Ok(Self { client, settings })
    }

    fn is_article_type(&self, content_type: &str) -> bool {
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        self.settings
            .article_types
            .iter()
            .any(|accepted| accepted.eq_ignore_ascii_case(essence))
    }

    async fn attempt(&self, url: reqwest::Url) -> Result<FetchedPage, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| self.classify(err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let too_large = FetchError::TooLarge {
            max_bytes: self.settings.max_bytes,
        };
        if response
            .content_length()
            .is_some_and(|len| len > self.settings.max_bytes)
        {
            return Err(too_large);
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        if let Some(ct) = content_type.as_deref().filter(|ct| !self.is_article_type(ct)) {
            return Err(FetchError::NotAnArticle(ct.to_string()));
        }

        let final_url = response.url().to_string();
        let mut body = Vec::new();
        let mut chunks = response.bytes_stream();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|err| self.classify(err))?;
            if (body.len() + chunk.len()) as u64 > self.settings.max_bytes {
                return Err(too_large);
            }
            body.extend_from_slice(&chunk);
        }
        pilot_debug!("fetched {} bytes from {}", body.len(), final_url);
        Ok(FetchedPage {
            url: final_url,
            content_type,
            body,
        })
    }

    fn classify(&self, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_redirect() {
            FetchError::TooManyRedirects(self.settings.redirect_limit)
        } else {
            FetchError::Network(err.to_string())
        }
    }

    async fn fetch_with_retries(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }
        let mut attempt = 0;
        loop {
            match self.attempt(parsed.clone()).await {
                Err(err) if err.is_transient() && attempt < self.settings.retries => {
                    attempt += 1;
                    pilot_info!("fetch of {} failed ({}), retry {}", url, err, attempt);
                    tokio::time::sleep(self.settings.retry_backoff * attempt).await;
                }
                result => return result,
            }
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for ReqwestFetcher {
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, FetchError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.fetch_with_retries(url) => result,
        }
    }
}
