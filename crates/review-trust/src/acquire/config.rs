//! Acquisition settings: defaults overridden from the environment.
//!
//! | Variable | Effect |
//! |---|---|
//! | `SCRAPING_ENABLED` | master switch |
//! | `SCRAPING_HEADLESS` | run Chromium headless |
//! | `SCRAPING_BROWSER_FALLBACK` | allow the browser stage |
//! | `SCRAPING_BROWSER_LOGIN` | allow interactive sign-in |
//! | `SCRAPING_STORAGE_STATE` | session state file |
//! | `AMZN_EMAIL`, `AMZN_PASSWORD`, `AMZN_OTP` | sign-in credentials |
//! | `REVIEW_TRUST_CHROMIUM_PATH` | Chromium binary |

use crate::fetch::browser::chromium::CHROMIUM_PATH_ENV;
use crate::fetch::browser::{BrowserSettings, Credentials};
use crate::fetch::HttpConfig;
use crate::parse::reviews::DEFAULT_BASE_URL;
use std::path::PathBuf;

pub const DEFAULT_REVIEW_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct AcquireConfig {
    pub enabled: bool,
    pub browser_fallback: bool,
    /// Site root; overridable so tests can point at a local server.
    pub base_url: String,
    pub default_limit: usize,
    pub http: HttpConfig,
    pub browser: BrowserSettings,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            browser_fallback: true,
            base_url: DEFAULT_BASE_URL.to_string(),
            default_limit: DEFAULT_REVIEW_LIMIT,
            http: HttpConfig::default(),
            browser: BrowserSettings::default(),
        }
    }
}

/// `1/true/yes/on` and `0/false/no/off`, case-insensitive. Anything else is ignored.
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl AcquireConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`, which returns a variable's value if set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let flag = |key: &str| lookup(key).as_deref().and_then(parse_flag);
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = flag("SCRAPING_ENABLED") {
            config.enabled = v;
        }
        if let Some(v) = flag("SCRAPING_BROWSER_FALLBACK") {
            config.browser_fallback = v;
        }
        if let Some(v) = flag("SCRAPING_HEADLESS") {
            config.browser.headless = v;
        }
        if let Some(v) = flag("SCRAPING_BROWSER_LOGIN") {
            config.browser.allow_login = v;
        }
        if let Some(path) = text("SCRAPING_STORAGE_STATE") {
            config.browser.storage_state = PathBuf::from(path);
        }
        if let Some(path) = text(CHROMIUM_PATH_ENV) {
            config.browser.chromium_path = Some(PathBuf::from(path));
        }
        if let (Some(email), Some(password)) = (text("AMZN_EMAIL"), text("AMZN_PASSWORD")) {
            config.browser.account = email.clone();
            config.browser.credentials = Some(Credentials {
                email,
                password,
                otp: text("AMZN_OTP"),
            });
        }
        config
    }
}
