//! Polite HTTP fetching of distributor listing pages.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use pricewatch_core::Distributor;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::{AcquireError, Semaphore};
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    /// Total tries per page, first request included.
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Pages in flight across all distributors. Each distributor is always limited to one.
    pub max_in_flight: usize,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
            max_in_flight: 3,
        }
    }
}

impl FetchPolicy {
    /// Exponential delay after the failed try number `attempt` (0-based), capped at `max_delay`.
    pub fn backoff(&self, attempt: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay before the next try, preferring the server's `Retry-After` hint.
    pub fn delay_before_retry(&self, attempt: usize, retry_after: Option<Duration>) -> Duration {
        retry_after
            .map(|hint| hint.min(self.max_delay))
            .unwrap_or_else(|| self.backoff(attempt))
    }
}

/// Throttling and server-side failures are worth another try; anything else is final.
pub fn retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

pub fn retryable_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Only the delta-seconds form of `Retry-After` is honored.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[derive(Debug, Clone)]
pub struct ListingPage {
    pub status: u16,
    pub final_url: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("fetch limiter closed")]
    Closed(#[from] AcquireError),
}

#[derive(Debug)]
pub struct ListingFetcher {
    client: reqwest::Client,
    policy: FetchPolicy,
    in_flight: Semaphore,
    per_distributor: HashMap<Distributor, Semaphore>,
}

impl ListingFetcher {
    pub fn new(policy: FetchPolicy) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(policy.timeout);
        if let Some(user_agent) = &policy.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building listing http client")?;

        Ok(Self {
            client,
            in_flight: Semaphore::new(policy.max_in_flight.max(1)),
            per_distributor: Distributor::ALL
                .iter()
                .map(|d| (*d, Semaphore::new(1)))
                .collect(),
            policy,
        })
    }

    pub async fn fetch(
        &self,
        run_id: Uuid,
        distributor: Distributor,
        url: &str,
    ) -> Result<ListingPage, FetchError> {
        let _slot = self.in_flight.acquire().await?;
        let _turn = match self.per_distributor.get(&distributor) {
            Some(sem) => Some(sem.acquire().await?),
            None => None,
        };

        let span = info_span!("listing_fetch", %run_id, %distributor, url);
        self.fetch_with_retries(url).instrument(span).await
    }

    async fn fetch_with_retries(&self, url: &str) -> Result<ListingPage, FetchError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            let last_try = attempt + 1 >= attempts;
            let hint = match self.client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    let status = resp.status().as_u16();
                    let final_url = resp.url().to_string();
                    let html = resp.text().await.map_err(|source| FetchError::Transport {
                        url: final_url.clone(),
                        source,
                    })?;
                    debug!(status, bytes = html.len(), "listing page fetched");
                    return Ok(ListingPage {
                        status,
                        final_url,
                        html,
                    });
                }
                Ok(resp) => {
                    let status = resp.status();
                    if last_try || !retryable_status(status) {
                        return Err(FetchError::Status {
                            status: status.as_u16(),
                            url: resp.url().to_string(),
                        });
                    }
                    warn!(status = status.as_u16(), attempt, "listing fetch throttled or failed");
                    retry_after(resp.headers())
                }
                Err(source) => {
                    if last_try || !retryable_transport(&source) {
                        return Err(FetchError::Transport {
                            url: url.to_string(),
                            source,
                        });
                    }
                    warn!(error = %source, attempt, "listing fetch transport error");
                    None
                }
            };
            tokio::time::sleep(self.policy.delay_before_retry(attempt, hint)).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{http::StatusCode as ServerStatus, routing::get, Router};
    use reqwest::header::HeaderValue;

    /// Listing endpoint answering with `statuses` in order, then 200 for every later hit.
    async fn listing_server(statuses: Vec<u16>) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/ca/lacteos",
            get(move || {
                let counter = counter.clone();
                let statuses = statuses.clone();
                async move {
                    let hit = counter.fetch_add(1, Ordering::SeqCst);
                    let code = statuses.get(hit).copied().unwrap_or(200);
                    (
                        ServerStatus::from_u16(code).unwrap(),
                        [(axum::http::header::RETRY_AFTER, "0")],
                        "<div class=\"prod-card\">Leche Entera 1L</div>",
                    )
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/ca/lacteos"), hits)
    }

    fn quick_policy(max_attempts: usize) -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_secs(5),
            max_attempts,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            ..Default::default()
        }
    }

    #[test]
    fn backoff_doubles_until_capped() {
        let policy = FetchPolicy {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            ..Default::default()
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(350));
        assert_eq!(policy.backoff(40), Duration::from_millis(350));
    }

    #[test]
    fn retry_after_hint_wins_but_is_capped() {
        let policy = FetchPolicy::default();
        assert_eq!(
            policy.delay_before_retry(0, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        assert_eq!(
            policy.delay_before_retry(0, Some(Duration::from_secs(600))),
            policy.max_delay
        );
        assert_eq!(policy.delay_before_retry(1, None), policy.backoff(1));
    }

    #[test]
    fn retry_after_header_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static(" 3 "));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(3)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn throttling_and_server_errors_are_retryable() {
        assert!(retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(retryable_status(StatusCode::BAD_GATEWAY));
        assert!(retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!retryable_status(StatusCode::NOT_FOUND));
        assert!(!retryable_status(StatusCode::FORBIDDEN));
    }

    #[test]
    fn every_distributor_gets_its_own_lane() {
        let fetcher = ListingFetcher::new(FetchPolicy::default()).unwrap();
        for d in Distributor::ALL {
            assert!(fetcher.per_distributor.contains_key(&d));
        }
    }

    #[tokio::test]
    async fn unavailable_page_is_retried_until_it_loads() {
        let (url, hits) = listing_server(vec![503, 429]).await;
        let fetcher = ListingFetcher::new(quick_policy(3)).unwrap();

        let page = fetcher.fetch(Uuid::nil(), Distributor::D1, &url).await.unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(page.final_url, url);
        assert!(page.html.contains("Leche Entera 1L"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retries_stop_at_max_attempts() {
        let (url, hits) = listing_server(vec![503, 503, 503]).await;
        let fetcher = ListingFetcher::new(quick_policy(2)).unwrap();

        let err = fetcher.fetch(Uuid::nil(), Distributor::Exito, &url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }), "{err}");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (url, hits) = listing_server(vec![404]).await;
        let fetcher = ListingFetcher::new(quick_policy(4)).unwrap();

        let err = fetcher.fetch(Uuid::nil(), Distributor::Olimpica, &url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }), "{err}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
