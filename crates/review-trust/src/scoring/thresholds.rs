//! Scoring thresholds: YAML schema, defaults, and a hot-reloading provider.
//!
//! ## Path resolution
//!
//! 1. Explicit path passed by the caller
//! 2. `SCORING_THRESHOLDS_PATH` env var
//! 3. `./scoring/thresholds.yml`
//! 4. `~/.review-trust/thresholds.yml`
//!
//! A missing file means defaults. A file that fails to parse keeps whatever
//! snapshot was active before and logs a warning.

use crate::error::{TrustError, TrustResult};
use crate::features::NoiseParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};

pub const THRESHOLDS_ENV: &str = "SCORING_THRESHOLDS_PATH";
const CWD_THRESHOLDS: &str = "scoring/thresholds.yml";

/// Rule weights; each is the share of the 100-point risk budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub dist_bias: f64,
    pub duplicates: f64,
    pub surge: f64,
    pub noise: f64,
}

/// Attention bands in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub warn: f64,
    pub crit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBands {
    pub dist_bias: Band,
    pub duplicates: Band,
    pub surge: Band,
    pub noise: Band,
}

/// Cut-points on the two judgment signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JudgmentCut {
    pub dist_bias: f64,
    pub duplicates: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgmentBands {
    pub sakura: JudgmentCut,
    pub likely: JudgmentCut,
    pub unlikely: JudgmentCut,
}

/// Complete threshold set consumed by the scorer and feature extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub weights: Weights,
    pub feature_percent: FeatureBands,
    pub sakura_percent: JudgmentBands,
    pub noise: NoiseParams,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            weights: Weights {
                dist_bias: 0.35,
                duplicates: 0.35,
                surge: 0.20,
                noise: 0.10,
            },
            feature_percent: FeatureBands {
                dist_bias: Band { warn: 65.0, crit: 80.0 },
                duplicates: Band { warn: 40.0, crit: 55.0 },
                surge: Band { warn: 40.0, crit: 65.0 },
                noise: Band { warn: 35.0, crit: 55.0 },
            },
            sakura_percent: JudgmentBands {
                sakura: JudgmentCut { dist_bias: 80.0, duplicates: 50.0 },
                likely: JudgmentCut { dist_bias: 65.0, duplicates: 40.0 },
                unlikely: JudgmentCut { dist_bias: 45.0, duplicates: 0.0 },
            },
            noise: NoiseParams::default(),
        }
    }
}

impl Thresholds {
    /// Parse YAML over the defaults. Every key is optional; unknown keys are ignored.
    pub fn from_yaml(text: &str) -> TrustResult<Self> {
        let mut base = serde_yaml::to_value(Thresholds::default())?;
        let overlay: serde_yaml::Value = serde_yaml::from_str(text)?;
        merge_yaml(&mut base, overlay);
        let thresholds: Thresholds = serde_yaml::from_value(base)?;
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Weights must be finite shares in `0.0..=1.0`.
    pub fn validate(&self) -> TrustResult<()> {
        let w = &self.weights;
        for (name, value) in [
            ("dist_bias", w.dist_bias),
            ("duplicates", w.duplicates),
            ("surge", w.surge),
            ("noise", w.noise),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(TrustError::Config(format!(
                    "weights.{name} must be between 0 and 1, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> TrustResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Recursively overlay `overlay` onto `base`. Mappings merge key by key, anything else replaces.
fn merge_yaml(base: &mut serde_yaml::Value, overlay: serde_yaml::Value) {
    use serde_yaml::Value;
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(slot) => merge_yaml(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        // An empty document leaves the defaults untouched.
        (_, Value::Null) => {}
        (slot, value) => *slot = value,
    }
}

/// Resolve the thresholds file path.
pub fn resolve_thresholds_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    if let Ok(p) = std::env::var(THRESHOLDS_ENV) {
        if !p.trim().is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    let cwd = PathBuf::from(CWD_THRESHOLDS);
    if cwd.exists() {
        return Some(cwd);
    }
    dirs::home_dir().map(|h| h.join(".review-trust").join("thresholds.yml"))
}

/// Holds the active [`Thresholds`] snapshot and reloads it when the file changes.
///
/// Readers get an `Arc` clone, so a reload never disturbs a scoring call in flight.
pub struct ThresholdsProvider {
    path: Option<PathBuf>,
    /// Snapshot and the version it was installed as, swapped together.
    current: RwLock<(Arc<Thresholds>, u64)>,
    last_modified: Mutex<Option<SystemTime>>,
}

impl ThresholdsProvider {
    /// Load from the resolved path. Never fails: problems fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> Self {
        let provider = Self::with_path(resolve_thresholds_path(explicit));
        provider.refresh();
        provider
    }

    /// A provider serving fixed thresholds with no backing file.
    pub fn fixed(thresholds: Thresholds) -> Self {
        Self {
            path: None,
            current: RwLock::new((Arc::new(thresholds), 0)),
            last_modified: Mutex::new(None),
        }
    }

    fn with_path(path: Option<PathBuf>) -> Self {
        Self {
            path,
            ..Self::fixed(Thresholds::default())
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current snapshot together with its version, read under one lock.
    pub fn snapshot(&self) -> (Arc<Thresholds>, u64) {
        let guard = self.current.read().unwrap_or_else(|p| p.into_inner());
        (Arc::clone(&guard.0), guard.1)
    }

    /// Current snapshot.
    pub fn current(&self) -> Arc<Thresholds> {
        self.snapshot().0
    }

    /// Incremented on every successful swap.
    pub fn version(&self) -> u64 {
        self.snapshot().1
    }

    /// Reload if the file's modification time changed. Returns true when a new snapshot was installed.
    pub fn refresh(&self) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        let modified = match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(m) => m,
            Err(_) => return false,
        };
        {
            let mut last = self.last_modified.lock().unwrap_or_else(|p| p.into_inner());
            if *last == Some(modified) {
                return false;
            }
            *last = Some(modified);
        }
        self.reload_from(path)
    }

    /// Reload regardless of timestamps.
    pub fn reload(&self) -> bool {
        match &self.path {
            Some(path) => self.reload_from(path),
            None => false,
        }
    }

    fn reload_from(&self, path: &Path) -> bool {
        let parsed = std::fs::read_to_string(path)
            .map_err(TrustError::from)
            .and_then(|text| Thresholds::from_yaml(&text));
        match parsed {
            Ok(thresholds) => {
                tracing::info!(path = %path.display(), "loaded scoring thresholds");
                self.swap(thresholds);
                true
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to load thresholds; keeping previous values"
                );
                false
            }
        }
    }

    /// Write thresholds as YAML to the backing file and make them current.
    pub fn save(&self, thresholds: Thresholds) -> TrustResult<()> {
        thresholds.validate()?;
        let Some(path) = &self.path else {
            tracing::warn!("no thresholds path configured; applying in memory only");
            self.swap(thresholds);
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, thresholds.to_yaml()?)?;
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        *self.last_modified.lock().unwrap_or_else(|p| p.into_inner()) = modified;
        self.swap(thresholds);
        tracing::info!(path = %path.display(), "thresholds persisted");
        Ok(())
    }

    fn swap(&self, thresholds: Thresholds) {
        let mut guard = self.current.write().unwrap_or_else(|p| p.into_inner());
        let version = guard.1 + 1;
        *guard = (Arc::new(thresholds), version);
    }

    /// Poll [`refresh`](Self::refresh) every `interval` on a background task.
    pub fn spawn_watcher(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let provider = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if provider.refresh() {
                    tracing::debug!(version = provider.version(), "thresholds reloaded by watcher");
                }
            }
        })
    }
}
