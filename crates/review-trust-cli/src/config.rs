//! Path resolution and command-line overrides for the acquisition settings.

use std::path::{Path, PathBuf};

use review_trust::acquire::AcquireConfig;

/// Environment variable naming the default output directory.
pub const OUTPUT_DIR_ENV: &str = "REVIEW_TRUST_OUT";

const DEFAULT_OUTPUT_DIR: &str = "build/review-trust";

/// Resolve the directory acquisitions are written to.
pub fn resolve_output_dir(explicit: Option<&Path>) -> PathBuf {
    resolve_output_dir_with(explicit, |key| std::env::var(key).ok())
}

fn resolve_output_dir_with(explicit: Option<&Path>, lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(env_path) = lookup(OUTPUT_DIR_ENV).filter(|p| !p.trim().is_empty()) {
        return PathBuf::from(env_path);
    }
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

/// Flags that win over the environment.
#[derive(Debug, Clone, Default)]
pub struct AcquireOverrides {
    pub base_url: Option<String>,
    pub no_browser: bool,
    pub headed: bool,
    pub login: bool,
    pub storage_state: Option<PathBuf>,
    pub chromium: Option<PathBuf>,
}

impl AcquireOverrides {
    pub fn apply(&self, mut config: AcquireConfig) -> AcquireConfig {
        if let Some(base) = &self.base_url {
            config.base_url = base.clone();
        }
        if self.no_browser {
            config.browser_fallback = false;
        }
        if self.headed {
            config.browser.headless = false;
        }
        if self.login {
            config.browser.allow_login = true;
        }
        if let Some(path) = &self.storage_state {
            config.browser.storage_state = path.clone();
        }
        if let Some(path) = &self.chromium {
            config.browser.chromium_path = Some(path.clone());
        }
        config
    }
}
