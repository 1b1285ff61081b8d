//! Polite HTTP transport for the snapshot store.

use crate::config::StoreConfig;
use crate::fetch::FetchError;
use rand::RngExt;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

pub struct HttpClient {
    inner: reqwest::Client,
    config: StoreConfig,
}

impl HttpClient {
    pub fn new(config: &StoreConfig) -> Result<Self, FetchError> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based stores work
            .cookie_store(true)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// Fetch a URL as bytes, with rate-limiting and exponential-backoff
    /// retry on transient failures. Auth and other 4xx fail immediately.
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.polite_delay().await;

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(self.config.request_delay_ms.max(1))
            .map(jitter)
            .take(self.config.max_retries as usize);

        RetryIf::spawn(strategy, || self.try_get(url), FetchError::is_transient).await
    }

    async fn try_get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("GET {}", url);

        let mut request = self.inner.get(url);
        if let Some(token) = &self.config.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(format!("request error: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| FetchError::Transport(format!("body read error: {e}")))?;
            return Ok(bytes.to_vec());
        }

        match status.as_u16() {
            401 | 403 => Err(FetchError::Auth(format!("HTTP {status}"))),
            429 | 503 => {
                // Rate limited: let the retry strategy back off
                warn!("Store throttled ({}), retrying", status);
                Err(FetchError::Transport(format!("HTTP {status}")))
            }
            _ => Err(FetchError::Store(format!("HTTP {status}"))),
        }
    }

    /// Sleep for the configured delay + random jitter.
    async fn polite_delay(&self) {
        let jitter_ms = rand::rng().random_range(0..=self.config.jitter_ms);
        let total = Duration::from_millis(self.config.request_delay_ms + jitter_ms);
        sleep(total).await;
    }
}
