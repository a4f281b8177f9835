//! Rule evaluation: features → bounded risk score, rank, judgment, evidence.
//!
//! [`score`] is pure and total. Points and flags are computed independently:
//! points scale with the value and weight, flags fire at the `warn` band.
//! The judgment level only looks at distribution bias and duplicates.

pub mod service;
pub mod thresholds;

pub use service::ScoreService;
pub use thresholds::{resolve_thresholds_path, Thresholds, ThresholdsProvider};

use crate::features::FeatureSummary;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thresholds::Band;

pub const FLAG_DISTRIBUTION: &str = "ATTN_DISTRIBUTION";
pub const FLAG_DUPLICATE: &str = "ATTN_DUPLICATE";
pub const FLAG_SURGE: &str = "ATTN_SURGE";
pub const FLAG_NOISE: &str = "ATTN_NOISE";

/// Tri-band cut of the risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rank {
    A,
    B,
    C,
}

impl Rank {
    pub fn from_risk(risk: u32) -> Self {
        if risk < 35 {
            Rank::A
        } else if risk < 65 {
            Rank::B
        } else {
            Rank::C
        }
    }
}

/// Qualitative sakura judgment, ordered from least to most suspicious.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Judgment {
    Genuine,
    Unlikely,
    Likely,
    Sakura,
}

/// Why a rule contributed what it did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleEvidence {
    pub id: String,
    pub value: f64,
    pub warn: f64,
    pub crit: f64,
    pub weight: f64,
    pub points: u32,
    #[serde(default)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub risk_score: u32,
    pub display_score: u32,
    pub rank: Rank,
    pub judgment: Judgment,
    pub flags: Vec<String>,
    pub rule_evidence: Vec<RuleEvidence>,
    pub metrics: Map<String, Value>,
}

impl ScoreResult {
    /// Fixed result for an empty review set.
    pub fn insufficient_data() -> Self {
        let mut metrics = Map::new();
        metrics.insert("total_reviews".into(), json!(0));
        Self {
            risk_score: 0,
            display_score: 100,
            rank: Rank::A,
            judgment: Judgment::Genuine,
            flags: Vec::new(),
            rule_evidence: Vec::new(),
            metrics,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Each rule is worth at most 100 points, whatever the configured weight.
fn points(value: f64, weight: f64) -> u32 {
    let v = (value / 100.0).clamp(0.0, 1.0);
    let w = if weight.is_finite() { weight.clamp(0.0, 1.0) } else { 0.0 };
    (v * w * 100.0).round() as u32
}

fn extra(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn evidence(id: &str, value: f64, band: Band, weight: f64, extra: Map<String, Value>) -> RuleEvidence {
    RuleEvidence {
        id: id.to_string(),
        value: round2(value),
        warn: band.warn,
        crit: band.crit,
        weight,
        points: points(value, weight),
        extra,
    }
}

/// Classify on distribution bias and duplicate ratio against the judgment bands.
pub fn judge(dist_bias: f64, duplicate_ratio: f64, t: &Thresholds) -> Judgment {
    let bands = &t.sakura_percent;
    if dist_bias >= bands.sakura.dist_bias && duplicate_ratio >= bands.sakura.duplicates {
        Judgment::Sakura
    } else if dist_bias >= bands.likely.dist_bias || duplicate_ratio >= bands.likely.duplicates {
        Judgment::Likely
    } else if dist_bias >= bands.unlikely.dist_bias
        || (bands.unlikely.duplicates > 0.0 && duplicate_ratio >= bands.unlikely.duplicates)
    {
        Judgment::Unlikely
    } else {
        Judgment::Genuine
    }
}

/// Score a feature summary against a threshold set.
pub fn score(features: &FeatureSummary, t: &Thresholds) -> ScoreResult {
    if features.total_reviews == 0 {
        return ScoreResult::insufficient_data();
    }
    let c = &features.counters;
    let bands = &t.feature_percent;
    let w = &t.weights;

    let rules = vec![
        evidence(
            "dist_bias",
            features.dist_bias,
            bands.dist_bias,
            w.dist_bias,
            extra(&[
                ("five_star_count", json!(c.five_star_count)),
                ("total_reviews", json!(features.total_reviews)),
            ]),
        ),
        evidence(
            "duplicates",
            features.duplicate_ratio,
            bands.duplicates,
            w.duplicates,
            extra(&[
                ("max_cluster", json!(c.max_cluster)),
                ("cluster_ratio", json!(round2(features.duplicate_ratio))),
            ]),
        ),
        evidence(
            "surge",
            features.surge_ratio,
            bands.surge,
            w.surge,
            extra(&[
                ("max_day_reviews", json!(c.max_day_reviews)),
                ("days_tracked", json!(c.day_buckets)),
                ("avg_reviews_per_day", json!(round2(c.avg_reviews_per_day))),
            ]),
        ),
        evidence(
            "noise",
            features.noise_ratio,
            bands.noise,
            w.noise,
            extra(&[
                ("url_hits", json!(c.url_hits)),
                ("emoji_hits", json!(c.emoji_hits)),
                ("symbol_runs", json!(c.symbol_runs)),
                ("short_reviews", json!(c.short_reviews)),
            ]),
        ),
    ];

    let risk_score = rules.iter().fold(0u32, |acc, r| acc.saturating_add(r.points)).min(100);

    let mut flags = Vec::new();
    for (value, band, flag) in [
        (features.dist_bias, bands.dist_bias, FLAG_DISTRIBUTION),
        (features.duplicate_ratio, bands.duplicates, FLAG_DUPLICATE),
        (features.surge_ratio, bands.surge, FLAG_SURGE),
        (features.noise_ratio, bands.noise, FLAG_NOISE),
    ] {
        if value >= band.warn {
            flags.push(flag.to_string());
        }
    }

    let mut metrics = Map::new();
    metrics.insert("total_reviews".into(), json!(features.total_reviews));
    metrics.insert("dist_bias".into(), json!(round2(features.dist_bias)));
    metrics.insert("duplicate_ratio".into(), json!(round2(features.duplicate_ratio)));
    metrics.insert("surge_ratio".into(), json!(round2(features.surge_ratio)));
    metrics.insert("noise_ratio".into(), json!(round2(features.noise_ratio)));
    metrics.insert("max_duplicate_cluster".into(), json!(c.max_cluster));
    metrics.insert("max_day_reviews".into(), json!(c.max_day_reviews));
    metrics.insert("day_buckets".into(), json!(c.day_buckets));
    metrics.insert("avg_reviews_per_day".into(), json!(round2(c.avg_reviews_per_day)));

    ScoreResult {
        risk_score,
        display_score: 100 - risk_score,
        rank: Rank::from_risk(risk_score),
        judgment: judge(features.dist_bias, features.duplicate_ratio, t),
        flags,
        rule_evidence: rules,
        metrics,
    }
}
