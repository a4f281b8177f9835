//! Stateful browser fetch: session restore, bounded navigation, login on demand.

use super::login::{Credentials, LoginFlow, LoginTimeouts};
use super::session::{AccountLocks, SessionStore, StorageState};
use super::{dismiss_consent, BrowserEngine, BrowserPage};
use crate::error::FetchError;
use crate::fetch::{FetchMode, FetchOutcome, Fetcher};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_STORAGE_STATE: &str = "build/amazon-storage.json";

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub chromium_path: Option<PathBuf>,
    pub navigation_timeout: Duration,
    /// Delay before each navigation retry; its length is the retry count.
    pub navigation_backoff: Vec<Duration>,
    /// Whether a blocked page may trigger interactive sign-in.
    pub allow_login: bool,
    pub storage_state: PathBuf,
    /// Logical account whose session is serialized.
    pub account: String,
    pub credentials: Option<Credentials>,
    pub login_timeouts: LoginTimeouts,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chromium_path: None,
            navigation_timeout: Duration::from_secs(60),
            navigation_backoff: vec![Duration::from_secs(2), Duration::from_secs(5)],
            allow_login: false,
            storage_state: PathBuf::from(DEFAULT_STORAGE_STATE),
            account: "default".to_string(),
            credentials: None,
            login_timeouts: LoginTimeouts::default(),
        }
    }
}

/// Browser fetcher sharing one engine and one session file.
pub struct BrowserFetcher {
    engine: Arc<dyn BrowserEngine>,
    settings: BrowserSettings,
    store: SessionStore,
    locks: Arc<AccountLocks>,
}

impl BrowserFetcher {
    pub fn new(engine: Arc<dyn BrowserEngine>, settings: BrowserSettings) -> Self {
        Self::with_locks(engine, settings, Arc::new(AccountLocks::new()))
    }

    /// Share account locks with other fetchers using the same accounts.
    pub fn with_locks(engine: Arc<dyn BrowserEngine>, settings: BrowserSettings, locks: Arc<AccountLocks>) -> Self {
        let store = SessionStore::new(settings.storage_state.clone());
        Self {
            engine,
            settings,
            store,
            locks,
        }
    }

    pub fn settings(&self) -> &BrowserSettings {
        &self.settings
    }

    /// Load saved cookies into the page. Returns true when any were applied.
    async fn restore_session(&self, page: &dyn BrowserPage) -> bool {
        let state = match self.store.read() {
            Ok(Some(state)) => state,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!(path = %self.store.path().display(), error = %e, "unreadable session state; starting fresh");
                return false;
            }
        };
        let cookies = state.live_cookies();
        if cookies.is_empty() {
            return false;
        }
        match page.set_cookies(&cookies).await {
            Ok(()) => {
                tracing::debug!(cookies = cookies.len(), "session state restored");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to restore session state");
                false
            }
        }
    }

    /// Save the page's cookies. Failures are logged, not fatal.
    async fn persist_session(&self, page: &dyn BrowserPage) {
        let cookies = match page.cookies().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "could not read cookies for session state");
                return;
            }
        };
        if let Err(e) = self.store.write(&StorageState::new(cookies)) {
            tracing::warn!(path = %self.store.path().display(), error = %e, "failed to save session state");
        }
    }

    /// Navigate with a per-attempt timeout. Browser errors are retried on the
    /// backoff schedule; a timeout is returned as is for the caller to retry.
    async fn navigate(&self, page: &mut dyn BrowserPage, url: &str) -> Result<(), FetchError> {
        let mut retries = 0usize;
        loop {
            let err = match tokio::time::timeout(self.settings.navigation_timeout, page.navigate(url)).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => e,
                Err(_) => return Err(FetchError::Timeout(self.settings.navigation_timeout)),
            };
            let Some(delay) = self.settings.navigation_backoff.get(retries).copied() else {
                return Err(FetchError::Browser(err.to_string()));
            };
            retries += 1;
            tracing::warn!(url, error = %err, retry = retries, "navigation failed; retrying");
            tokio::time::sleep(delay).await;
        }
    }

    async fn capture(&self, page: &dyn BrowserPage, url: &str) -> Result<FetchOutcome, FetchError> {
        dismiss_consent(page).await;
        let html = page
            .get_html()
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?;
        let final_url = page.get_url().await.unwrap_or_else(|_| url.to_string());
        Ok(FetchOutcome::inspect(html, final_url, 200))
    }

    async fn fetch_on_page(&self, page: &mut dyn BrowserPage, url: &str) -> Result<FetchOutcome, FetchError> {
        let mut authenticated = self.restore_session(&*page).await;

        self.navigate(page, url).await?;
        let mut outcome = self.capture(&*page, url).await?;

        if outcome.blocked && self.settings.allow_login {
            match &self.settings.credentials {
                Some(credentials) => {
                    LoginFlow::new(&*page, credentials, &self.settings.login_timeouts)
                        .run()
                        .await?;
                    self.persist_session(&*page).await;
                    authenticated = true;

                    self.navigate(page, url).await?;
                    outcome = self.capture(&*page, url).await?;
                }
                None => tracing::warn!("page blocked and no credentials configured; skipping login"),
            }
        }

        if authenticated && !outcome.blocked {
            self.persist_session(&*page).await;
        }
        Ok(outcome)
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    fn mode(&self) -> FetchMode {
        FetchMode::Browser
    }

    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        let _guard = self.locks.lock(&self.settings.account).await;

        let mut page = self
            .engine
            .new_page()
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?;

        let result = self.fetch_on_page(page.as_mut(), url).await;
        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "page close failed");
        }
        tracing::debug!(url, ok = result.is_ok(), "browser fetch complete");
        result
    }
}
