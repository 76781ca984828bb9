use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Wall-clock source, swappable in tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// A source article as it came off the wire, before charset decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Address after redirects; relative links resolve against this.
    pub url: String,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("cannot fetch {0}")]
    InvalidUrl(String),
    #[error("source answered with status {0}")]
    Status(u16),
    #[error("source did not answer in time")]
    Timeout,
    #[error("source redirected more than {0} times")]
    TooManyRedirects(usize),
    #[error("source is larger than {max_bytes} bytes")]
    TooLarge { max_bytes: u64 },
    #[error("{0} is not an article page")]
    NotAnArticle(String),
    #[error("fetch cancelled")]
    Cancelled,
    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    /// Worth another attempt; everything else fails the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Network(_) => true,
            FetchError::Status(code) => *code == 429 || (500..=599).contains(code),
            _ => false,
        }
    }
}
