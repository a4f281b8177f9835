//! Fetch layer: stateless HTTP and stateful browser fetches behind one trait.
//!
//! A fetch that reaches the site but lands on a sign-in wall or CAPTCHA is a
//! successful fetch with `blocked = true`. Only transport-level problems are
//! errors.

pub mod block;
pub mod browser;
pub mod http;

pub use block::{detect_block, BlockReason};
pub use browser::{BrowserFetcher, BrowserSettings};
pub use http::{HttpConfig, HttpFetcher};

use crate::error::FetchError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Which strategy a fetcher implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    Http,
    Browser,
}

/// A page as delivered by a fetcher.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub html: String,
    /// URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub blocked: bool,
}

impl FetchOutcome {
    /// Build an outcome, running block detection on the page.
    pub fn inspect(html: String, final_url: String, status: u16) -> Self {
        let reason = detect_block(&final_url, &html);
        if let Some(reason) = reason {
            tracing::warn!(url = %final_url, ?reason, "page is blocked");
        }
        Self {
            html,
            final_url,
            status,
            blocked: reason.is_some(),
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    fn mode(&self) -> FetchMode;
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError>;
}
