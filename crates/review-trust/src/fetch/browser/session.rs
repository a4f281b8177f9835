//! Saved browser session state and per-account serialization.
//!
//! The state file is a JSON cookie list. Only one authenticated session per
//! account may be in use at a time; [`AccountLocks`] hands out the guard.

use crate::error::TrustResult;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    /// Seconds since the epoch; `None` for session cookies.
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageState {
    pub cookies: Vec<StoredCookie>,
    pub saved_at: DateTime<Utc>,
}

impl StorageState {
    pub fn new(cookies: Vec<StoredCookie>) -> Self {
        Self {
            cookies,
            saved_at: Utc::now(),
        }
    }

    /// Cookies that have not expired yet.
    pub fn live_cookies(&self) -> Vec<StoredCookie> {
        let now = Utc::now().timestamp() as f64;
        self.cookies
            .iter()
            .filter(|c| c.expires.map_or(true, |e| e <= 0.0 || e > now))
            .cloned()
            .collect()
    }
}

/// Read/write access to the storage-state file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load saved state. A missing file is `Ok(None)`.
    pub fn read(&self) -> TrustResult<Option<StorageState>> {
        if !self.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Write state through a temp file and rename, so readers never see a torn file.
    pub fn write(&self, state: &StorageState) -> TrustResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), cookies = state.cookies.len(), "session state saved");
        Ok(())
    }
}

/// One async mutex per logical account.
#[derive(Default)]
pub struct AccountLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `account`'s session.
    pub async fn lock(&self, account: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(account.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
