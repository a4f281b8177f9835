//! Feature extraction: review set → normalized ratios.
//!
//! All ratios are percentages in 0..=100. The extractor is a pure function
//! of its input; it keeps no state between calls.

use crate::normalize::comparison_form;
use crate::types::ReviewRecord;
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

fn url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)https?://|www\.|\.co(?:m|\.jp)\b|\.jp\b").expect("url regex is valid")
    })
}

/// Punctuation whose runs of three or more count as noise.
const RUN_CHARS: &[char] = &['!', '！', '?', '？', '.', ',', '。', '、', '〜', '～', 'ー', '-'];

/// Blend weights and thresholds for the noise ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    pub url: f64,
    pub emoji: f64,
    pub symbol: f64,
    pub short: f64,
    /// Bodies with fewer characters than this are short.
    pub short_chars: usize,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            url: 0.4,
            emoji: 0.2,
            symbol: 0.2,
            short: 0.2,
            short_chars: 60,
        }
    }
}

/// Raw counts behind the ratios, reported as rule evidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceCounters {
    pub five_star_count: usize,
    pub max_cluster: usize,
    pub max_day_reviews: usize,
    pub day_buckets: usize,
    pub avg_reviews_per_day: f64,
    pub url_hits: usize,
    pub emoji_hits: usize,
    pub symbol_runs: usize,
    pub short_reviews: usize,
}

/// Derived features of one review set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSummary {
    pub total_reviews: usize,
    pub dist_bias: f64,
    pub duplicate_ratio: f64,
    pub surge_ratio: f64,
    pub noise_ratio: f64,
    pub counters: EvidenceCounters,
}

/// Extract features with the default noise parameters.
pub fn extract(reviews: &[ReviewRecord]) -> FeatureSummary {
    extract_with(reviews, &NoiseParams::default())
}

/// Extract features with explicit noise parameters.
pub fn extract_with(reviews: &[ReviewRecord], noise: &NoiseParams) -> FeatureSummary {
    let total = reviews.len();
    if total == 0 {
        return FeatureSummary::default();
    }
    let n = total as f64;

    // ── Distribution bias ──
    let five_star_count = reviews.iter().filter(|r| r.rating == 5).count();
    let dist_bias = five_star_count as f64 / n * 100.0;

    // ── Duplicate clusters ──
    let max_cluster = largest_cluster(reviews);
    let duplicate_ratio = max_cluster as f64 / n * 100.0;

    // ── Surge ──
    let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
    for r in reviews {
        *per_day.entry(r.day()).or_default() += 1;
    }
    let day_buckets = per_day.len();
    let max_day_reviews = per_day.values().copied().max().unwrap_or(0);
    let avg_reviews_per_day = n / day_buckets.max(1) as f64;
    let surge_ratio = if avg_reviews_per_day > 0.0 {
        (max_day_reviews as f64 / avg_reviews_per_day * 100.0).min(100.0)
    } else {
        0.0
    };

    // ── Noise ──
    let mut url_hits = 0;
    let mut emoji_hits = 0;
    let mut symbol_runs = 0;
    let mut short_reviews = 0;
    for r in reviews {
        let body = r.body.as_deref().map(str::trim).unwrap_or("");
        if body.is_empty() {
            short_reviews += 1;
            continue;
        }
        if url_re().is_match(body) {
            url_hits += 1;
        }
        if body.chars().any(is_emoji) {
            emoji_hits += 1;
        }
        if has_symbol_run(body) {
            symbol_runs += 1;
        }
        if body.chars().count() < noise.short_chars {
            short_reviews += 1;
        }
    }
    let blended = noise.url * url_hits as f64 / n
        + noise.emoji * emoji_hits as f64 / n
        + noise.symbol * symbol_runs as f64 / n
        + noise.short * short_reviews as f64 / n;
    let noise_ratio = (blended * 100.0).clamp(0.0, 100.0);

    FeatureSummary {
        total_reviews: total,
        dist_bias,
        duplicate_ratio,
        surge_ratio,
        noise_ratio,
        counters: EvidenceCounters {
            five_star_count,
            max_cluster,
            max_day_reviews,
            day_buckets,
            avg_reviews_per_day,
            url_hits,
            emoji_hits,
            symbol_runs,
            short_reviews,
        },
    }
}

/// Cluster key: fingerprint, else reviewer, else body text. Blank keys are not clustered.
fn cluster_key(r: &ReviewRecord) -> Option<String> {
    fn non_blank(s: Option<&str>) -> Option<&str> {
        s.map(str::trim).filter(|s| !s.is_empty())
    }
    if let Some(fp) = non_blank(r.fingerprint.as_deref()) {
        return Some(format!("fp:{fp}"));
    }
    if let Some(author) = non_blank(r.author.as_deref()) {
        return Some(format!("rv:{}", author.to_lowercase()));
    }
    non_blank(r.body.as_deref())
        .map(comparison_form)
        .filter(|b| !b.is_empty())
        .map(|b| format!("tx:{b}"))
}

fn largest_cluster(reviews: &[ReviewRecord]) -> usize {
    let mut clusters: HashMap<String, usize> = HashMap::new();
    for key in reviews.iter().filter_map(cluster_key) {
        *clusters.entry(key).or_default() += 1;
    }
    clusters.values().copied().max().unwrap_or(0)
}

fn is_emoji(c: char) -> bool {
    let cp = c as u32;
    cp >= 0x1F000
        || (0x2600..=0x27BF).contains(&cp)
        || (0x2B00..=0x2BFF).contains(&cp)
}

fn has_symbol_run(text: &str) -> bool {
    let mut prev: Option<char> = None;
    let mut run = 0;
    for c in text.chars() {
        if RUN_CHARS.contains(&c) && prev == Some(c) {
            run += 1;
            if run >= 3 {
                return true;
            }
        } else {
            run = if RUN_CHARS.contains(&c) { 1 } else { 0 };
        }
        prev = Some(c);
    }
    false
}
