//! Stateless HTTP fetch wrapping reqwest.
//!
//! Not a browser: sends fixed desktop headers, follows redirects, retries
//! transient failures on a fixed backoff schedule, and falls back to
//! HTTP/1.1 on protocol errors.

use super::{FetchMode, FetchOutcome, Fetcher};
use crate::error::{FetchError, TrustResult};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use std::time::Duration;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                              AppleWebKit/537.36 (KHTML, like Gecko) \
                              Chrome/120.0.0.0 Safari/537.36";
pub const ACCEPT_LANGUAGE_JA: &str = "ja-JP,ja;q=0.9,en-US;q=0.8,en;q=0.7";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Upper bound for a server-supplied `Retry-After`.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    /// Delay before each retry; its length is the retry count.
    pub backoff: Vec<Duration>,
    pub user_agent: String,
    pub accept_language: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            backoff: vec![Duration::from_secs(2), Duration::from_secs(5)],
            user_agent: USER_AGENT.to_string(),
            accept_language: ACCEPT_LANGUAGE_JA.to_string(),
        }
    }
}

/// HTTP fetcher for review and product pages.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    /// HTTP/1.1-only fallback client for CDNs that reject HTTP/2.
    h1_client: reqwest::Client,
    config: HttpConfig,
}

fn build_client(config: &HttpConfig, http1_only: bool) -> TrustResult<reqwest::Client> {
    let mut headers = HeaderMap::new();
    if let Ok(v) = HeaderValue::from_str(&config.accept_language) {
        headers.insert(ACCEPT_LANGUAGE, v);
    }
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HTML));

    let mut builder = reqwest::Client::builder()
        .timeout(config.timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent(config.user_agent.as_str())
        .default_headers(headers);
    if http1_only {
        builder = builder.http1_only();
    }
    Ok(builder.build()?)
}

fn is_transient(status: u16) -> bool {
    status == 429 || status == 503 || status >= 500
}

fn looks_like_protocol_error(message: &str) -> bool {
    message.contains("http2") || message.contains("protocol") || message.contains("connection closed")
}

impl HttpFetcher {
    pub fn new(config: HttpConfig) -> TrustResult<Self> {
        Ok(Self {
            client: build_client(&config, false)?,
            h1_client: build_client(&config, true)?,
            config,
        })
    }

    async fn get_inner(&self, client: &reqwest::Client, url: &str) -> Result<FetchOutcome, FetchError> {
        let mut retries = 0usize;

        loop {
            let can_retry = retries < self.config.backoff.len();
            let delay = self.config.backoff.get(retries).copied().unwrap_or_default();

            match client.get(url).send().await {
                Ok(r) => {
                    let status = r.status().as_u16();

                    if is_transient(status) && can_retry {
                        let wait = if status == 429 {
                            r.headers()
                                .get(reqwest::header::RETRY_AFTER)
                                .and_then(|v| v.to_str().ok())
                                .and_then(|s| s.trim().parse::<u64>().ok())
                                .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
                                .unwrap_or(delay)
                        } else {
                            delay
                        };
                        retries += 1;
                        tracing::warn!(url, status, retry = retries, ?wait, "transient status; retrying");
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    let final_url = r.url().to_string();
                    match r.text().await {
                        Ok(html) => {
                            tracing::debug!(url, status, bytes = html.len(), "http fetch complete");
                            return Ok(FetchOutcome::inspect(html, final_url, status));
                        }
                        Err(e) if can_retry => {
                            retries += 1;
                            tracing::warn!(url, error = %e, retry = retries, "body read failed; retrying");
                            tokio::time::sleep(delay).await;
                            continue;
                        }
                        Err(e) => return Err(FetchError::Network(format!("reading body: {e}"))),
                    }
                }
                Err(e) if e.is_timeout() => {
                    return Err(FetchError::Timeout(self.config.timeout));
                }
                Err(e) => {
                    if can_retry {
                        retries += 1;
                        tracing::warn!(url, error = %e, retry = retries, "transport error; retrying");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn mode(&self) -> FetchMode {
        FetchMode::Http
    }

    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        match self.get_inner(&self.client, url).await {
            Err(FetchError::Network(msg)) if looks_like_protocol_error(&msg) => {
                tracing::debug!(url, "protocol error; retrying over HTTP/1.1");
                self.get_inner(&self.h1_client, url).await
            }
            other => other,
        }
    }
}
