//! HTTP fetching under a [`RetryPolicy`].

use std::time::Duration;

use bytes::Bytes;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::config::RetryPolicy;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("HTTP {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("request failed: {0}")]
    Transport(String),
}

impl FetchError {
    /// HTTP status of the failed response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status(code) => Some(*code),
            _ => None,
        }
    }

    /// Missing or forbidden resources are never retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Status(400..=499))
            || matches!(self, Self::Status(408 | 429))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Status(status.as_u16()),
            None => Self::Transport(e.to_string()),
        }
    }
}

/// Shared HTTP client for playlist and fragment requests.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_nodelay(true)
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// One GET, body included, bounded by `timeout`.
    pub async fn fetch_once(&self, url: &str, timeout: Duration) -> Result<Bytes, FetchError> {
        match tokio::time::timeout(timeout, self.get(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        }
    }

    async fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(resp.bytes().await?)
    }

    /// GET with retries. `on_retry` sees every failure that will be retried.
    pub async fn fetch(
        &self,
        url: &str,
        policy: &RetryPolicy,
        mut on_retry: impl FnMut(u32, &FetchError),
    ) -> Result<Bytes, FetchError> {
        let attempts = policy.attempts();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.fetch_once(url, policy.timeout()).await {
                Ok(body) => return Ok(body),
                Err(e) if attempt < attempts && e.is_retryable() => {
                    debug!("{url}: attempt {attempt}/{attempts} failed: {e}");
                    on_retry(attempt, &e);
                    tokio::time::sleep(policy.retry_delay()).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// GET a playlist as text.
    pub async fn fetch_text(&self, url: &str, policy: &RetryPolicy) -> Result<String, FetchError> {
        let body = self.fetch(url, policy, |_, _| {}).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(!FetchError::Status(404).is_retryable());
        assert!(!FetchError::Status(403).is_retryable());
        assert!(FetchError::Status(429).is_retryable());
        assert!(FetchError::Status(503).is_retryable());
        assert!(FetchError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(FetchError::Transport("reset".into()).is_retryable());
    }

    #[test]
    fn status_accessor() {
        assert_eq!(FetchError::Status(404).status(), Some(404));
        assert_eq!(FetchError::Transport("x".into()).status(), None);
    }

    #[tokio::test]
    async fn refused_connection_fails_without_retry_budget() {
        // bound then dropped: nothing listens on the port
        let addr = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .local_addr()
            .unwrap();
        let fetcher = Fetcher::new().unwrap();
        let policy = RetryPolicy::fail_fast(2_000);
        let mut retries = 0;
        let result = fetcher
            .fetch(&format!("http://{addr}/missing.m3u8"), &policy, |_, _| {
                retries += 1;
            })
            .await;
        assert!(matches!(result, Err(FetchError::Transport(_))));
        assert_eq!(retries, 0);
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        // accepts into the backlog but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let fetcher = Fetcher::new().unwrap();
        let result = fetcher
            .fetch_once(&format!("http://{addr}/slow.ts"), Duration::from_millis(100))
            .await;
        assert_eq!(result, Err(FetchError::Timeout(Duration::from_millis(100))));
        drop(listener);
    }
}
