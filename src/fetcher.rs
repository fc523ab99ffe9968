//! Range fetching from the Pwned Passwords API
//!
//! [`RangeSource`] makes a single request; [`RangeFetcher`] wraps it with a
//! fixed-delay retry budget.

use crate::config::RetryPolicy;
use crate::Error;
use futures::TryStreamExt;
use reqwest::StatusCode;
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::{debug, warn};

pub const DEFAULT_API_BASE_URL: &str = "https://api.pwnedpasswords.com/range/";

/// Streamed body of a successful range response
pub type RangeBody = Box<dyn AsyncRead + Send + Unpin>;

/// One attempt at retrieving a range
pub trait RangeSource: Send + Sync + 'static {
    fn fetch_once(&self, prefix: &str) -> impl Future<Output = Result<RangeBody, Error>> + Send;
}

/// Range source backed by the HTTP API
pub struct HttpRangeSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRangeSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pwned-ingest/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    pub fn url_for(&self, prefix: &str) -> String {
        format!("{}{}", self.base_url, prefix)
    }
}

impl RangeSource for HttpRangeSource {
    async fn fetch_once(&self, prefix: &str) -> Result<RangeBody, Error> {
        let response = self.client.get(self.url_for(prefix)).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            // Dropping the response releases the connection before any retry
            drop(response);
            return Err(Error::Status(status));
        }

        let stream = response.bytes_stream().map_err(io::Error::other);
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }
}

/// Fetches a range, retrying failed attempts after a fixed delay
pub struct RangeFetcher<S> {
    source: S,
    retry: RetryPolicy,
}

impl<S: RangeSource> RangeFetcher<S> {
    pub fn new(source: S, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch `prefix`, giving up after the configured number of attempts
    pub async fn fetch(&self, prefix: &str) -> Result<RangeBody, Error> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.source.fetch_once(prefix).await {
                Ok(body) => {
                    if attempt > 1 {
                        debug!("Range {} fetched on attempt {}", prefix, attempt);
                    }
                    return Ok(body);
                }
                Err(e) if attempt >= self.retry.attempts => {
                    return Err(Error::FetchExhausted {
                        prefix: prefix.to_string(),
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(
                        "Attempt {}/{} failed for range {}: {}",
                        attempt, self.retry.attempts, prefix, e
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
            }
        }
    }
}
