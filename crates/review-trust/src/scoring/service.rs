//! Caller-side scoring with a per-product result cache.

use super::thresholds::ThresholdsProvider;
use super::{score, ScoreResult};
use crate::cache::TtlCache;
use crate::features::{extract_with, FeatureSummary};
use crate::types::ReviewRecord;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How long a computed score stays valid.
pub const SCORE_CACHE_TTL: Duration = Duration::from_secs(600);

struct CacheState {
    entries: TtlCache<String, ScoreResult>,
    /// Thresholds version the entries were computed under.
    version: u64,
}

/// Extract features, score them with the current thresholds, cache by key.
pub struct ScoreService {
    provider: Arc<ThresholdsProvider>,
    cache: Mutex<CacheState>,
}

impl ScoreService {
    pub fn new(provider: Arc<ThresholdsProvider>) -> Self {
        Self::with_ttl(provider, SCORE_CACHE_TTL)
    }

    pub fn with_ttl(provider: Arc<ThresholdsProvider>, ttl: Duration) -> Self {
        let version = provider.version();
        Self {
            provider,
            cache: Mutex::new(CacheState {
                entries: TtlCache::new(ttl),
                version,
            }),
        }
    }

    pub fn provider(&self) -> &Arc<ThresholdsProvider> {
        &self.provider
    }

    /// Score `reviews` for `key`, reusing a fresh cached result when the thresholds are unchanged.
    pub fn score_reviews(&self, key: &str, reviews: &[ReviewRecord]) -> ScoreResult {
        let (thresholds, version) = self.provider.snapshot();

        {
            let mut state = self.cache.lock().unwrap_or_else(|p| p.into_inner());
            if state.version != version {
                tracing::debug!(from = state.version, to = version, "thresholds changed; clearing score cache");
                state.entries.clear();
                state.version = version;
            }
            if let Some(hit) = state.entries.get(&key.to_string()) {
                return hit;
            }
        }

        let features: FeatureSummary = extract_with(reviews, &thresholds.noise);
        let result = score(&features, &thresholds);
        tracing::info!(
            key,
            total_reviews = features.total_reviews,
            risk = result.risk_score,
            judgment = ?result.judgment,
            "scored reviews"
        );

        let mut state = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        if state.version == version {
            state.entries.insert(key.to_string(), result.clone());
        }
        result
    }

    /// Drop the cached score for one key, e.g. after new reviews were stored.
    pub fn invalidate(&self, key: &str) {
        let mut state = self.cache.lock().unwrap_or_else(|p| p.into_inner());
        state.entries.invalidate(&key.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::Thresholds;

    fn reviews(n: usize, rating: u8) -> Vec<ReviewRecord> {
        (0..n)
            .map(|i| {
                let body = format!("review body number {i}, long enough that it does not count as short");
                ReviewRecord::new(format!("r{i}"), rating, body)
            })
            .collect()
    }

    #[test]
    fn test_cached_until_invalidated() {
        let provider = Arc::new(ThresholdsProvider::fixed(Thresholds::default()));
        let service = ScoreService::new(provider);

        let first = service.score_reviews("B0TEST0001", &reviews(4, 5));
        // Different input under the same key hits the cache.
        let cached = service.score_reviews("B0TEST0001", &reviews(4, 1));
        assert_eq!(first, cached);

        service.invalidate("B0TEST0001");
        let fresh = service.score_reviews("B0TEST0001", &reviews(4, 1));
        assert_ne!(first.metrics["dist_bias"], fresh.metrics["dist_bias"]);
    }

    #[test]
    fn test_threshold_swap_clears_cache() {
        let provider = Arc::new(ThresholdsProvider::fixed(Thresholds::default()));
        let service = ScoreService::new(Arc::clone(&provider));
        let before = service.score_reviews("k", &reviews(4, 5));

        let mut t = Thresholds::default();
        t.weights.dist_bias = 0.0;
        provider.save(t).unwrap();

        let after = service.score_reviews("k", &reviews(4, 5));
        assert!(after.risk_score < before.risk_score);
    }

    #[test]
    fn test_zero_ttl_never_caches() {
        let provider = Arc::new(ThresholdsProvider::fixed(Thresholds::default()));
        let service = ScoreService::with_ttl(provider, Duration::ZERO);
        let a = service.score_reviews("k", &reviews(2, 5));
        let b = service.score_reviews("k", &reviews(2, 1));
        assert_ne!(a.judgment, b.judgment);
    }
}
