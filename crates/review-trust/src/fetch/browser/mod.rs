//! Browser abstraction for authenticated, script-rendered fetches.
//!
//! Defines the `BrowserEngine` and `BrowserPage` traits that abstract over
//! the browser (Chromium via chromiumoxide), plus the session store, the
//! login state machine and the `BrowserFetcher` built on top of them.

pub mod chromium;
pub mod fetcher;
pub mod login;
pub mod session;

pub use fetcher::{BrowserFetcher, BrowserSettings};
pub use login::{Credentials, LoginFlow, LoginStep, LoginTimeouts};
pub use session::{AccountLocks, SessionStore, StorageState, StoredCookie};

use anyhow::Result;
use async_trait::async_trait;

/// Cookie-consent banner accept button.
pub const CONSENT_ACCEPT: &str = "#sp-cc-accept";

/// A browser that can open pages.
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>>;
    async fn shutdown(&self) -> Result<()>;
}

/// A single page (tab).
///
/// The DOM helpers have default implementations on top of `execute_js`;
/// engines only need the primitives.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for the load to finish. Callers bound the wait.
    async fn navigate(&mut self, url: &str) -> Result<()>;
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    async fn get_html(&self) -> Result<String>;
    async fn get_url(&self) -> Result<String>;
    async fn cookies(&self) -> Result<Vec<StoredCookie>>;
    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<()>;
    async fn close(self: Box<Self>) -> Result<()>;

    async fn exists(&self, css: &str) -> Result<bool> {
        let script = format!("document.querySelector({}) !== null", js_string(css));
        Ok(self.execute_js(&script).await?.as_bool().unwrap_or(false))
    }

    /// Click the first match. Returns false when nothing matched.
    async fn click(&self, css: &str) -> Result<bool> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.click(); return true; }})()",
            js_string(css)
        );
        Ok(self.execute_js(&script).await?.as_bool().unwrap_or(false))
    }

    /// Set an input's value and fire input/change events. Returns false when nothing matched.
    async fn fill(&self, css: &str, value: &str) -> Result<bool> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; el.focus(); el.value = {}; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); return true; }})()",
            js_string(css),
            js_string(value)
        );
        Ok(self.execute_js(&script).await?.as_bool().unwrap_or(false))
    }

    async fn text_of(&self, css: &str) -> Result<Option<String>> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.textContent : null; }})()",
            js_string(css)
        );
        Ok(self
            .execute_js(&script)
            .await?
            .as_str()
            .map(|s| s.trim().to_string()))
    }
}

/// Quote a value as a JavaScript string literal.
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Click the consent banner if it is showing. Best-effort.
pub async fn dismiss_consent(page: &dyn BrowserPage) {
    match page.click(CONSENT_ACCEPT).await {
        Ok(true) => tracing::debug!("dismissed cookie consent"),
        Ok(false) => {}
        Err(e) => tracing::debug!(error = %e, "consent check failed"),
    }
}

/// A no-op engine used when Chromium is unavailable or browser fallback is off.
///
/// Every page request fails, so the browser stage reports the fetcher as
/// unavailable and the cascade moves on.
pub struct NoopEngine;

#[async_trait]
impl BrowserEngine for NoopEngine {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>> {
        Err(anyhow::anyhow!("browser not available; HTTP-only mode"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
