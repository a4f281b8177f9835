//! Per-review sakura heuristic.
//!
//! Each review gets a 0..=1 score blended from five signals measured against
//! the product's review set: repeated body text, five-star bias, repeat
//! authors, very short text and a positive rating on negative wording.
//! A review at or above [`FLAG_THRESHOLD`] is flagged.

use crate::types::ReviewRecord;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

pub const FLAG_THRESHOLD: f64 = 0.60;

const W_DUPLICATE: f64 = 0.35;
const W_BIAS: f64 = 0.25;
const W_AUTHOR: f64 = 0.15;
const W_SHORT: f64 = 0.15;
const W_MISMATCH: f64 = 0.10;

/// Five-star share considered normal.
const FIVE_STAR_BASELINE: f64 = 0.40;
/// Signals at or below this are left out of the reasons.
const REASON_FLOOR: f64 = 0.05;

const NEGATIVE_WORDS: &[&str] = &["ダメ", "良くない", "bad", "not", "嫌"];

/// Heuristic verdict for one review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewHeuristic {
    /// Blended score, rounded to four decimals.
    pub score: f64,
    /// Contributing signals, e.g. `dup1.00`, in a fixed order.
    pub reasons: Vec<String>,
    pub flag: bool,
}

/// Counts over a product's review set that the per-review signals compare against.
#[derive(Debug, Clone, Default)]
pub struct ProductStats {
    bodies: HashMap<[u8; 32], usize>,
    authors: HashMap<String, usize>,
    five_star: usize,
    total: usize,
}

/// Whitespace-free, lower-cased body hash. `None` for a blank body.
fn body_key(body: Option<&str>) -> Option<[u8; 32]> {
    let text: String = body?
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    if text.is_empty() {
        return None;
    }
    Some(Sha256::digest(text.as_bytes()).into())
}

fn author_key(author: Option<&str>) -> Option<String> {
    author
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_lowercase)
}

/// Unknown ratings count as one star.
fn stars(rating: u8) -> u8 {
    rating.clamp(1, 5)
}

impl ProductStats {
    pub fn from_reviews(reviews: &[ReviewRecord]) -> Self {
        let mut stats = ProductStats {
            total: reviews.len(),
            ..ProductStats::default()
        };
        for r in reviews {
            if let Some(key) = body_key(r.body.as_deref()) {
                *stats.bodies.entry(key).or_default() += 1;
            }
            if let Some(key) = author_key(r.author.as_deref()) {
                *stats.authors.entry(key).or_default() += 1;
            }
            if stars(r.rating) == 5 {
                stats.five_star += 1;
            }
        }
        stats
    }

    pub fn total(&self) -> usize {
        self.total
    }

    fn duplicate_signal(&self, review: &ReviewRecord) -> f64 {
        let Some(key) = body_key(review.body.as_deref()) else {
            return 0.0;
        };
        let copies = self.bodies.get(&key).copied().unwrap_or(0);
        if copies <= 1 {
            return 0.0;
        }
        let denom = (self.total as f64 / 10.0).max(1.0);
        ((copies - 1) as f64 / denom).clamp(0.0, 1.0)
    }

    fn author_signal(&self, review: &ReviewRecord) -> f64 {
        let Some(key) = author_key(review.author.as_deref()) else {
            return 0.0;
        };
        let count = self.authors.get(&key).copied().unwrap_or(0);
        if count <= 1 {
            return 0.0;
        }
        ((count - 1) as f64 / 5.0).min(1.0)
    }

    fn bias_signal(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let share = self.five_star as f64 / self.total as f64;
        if share <= FIVE_STAR_BASELINE {
            return 0.0;
        }
        ((share - FIVE_STAR_BASELINE) / (1.0 - FIVE_STAR_BASELINE)).clamp(0.0, 1.0)
    }
}

fn short_signal(body: Option<&str>) -> f64 {
    match body.map(|b| b.trim().chars().count()).unwrap_or(0) {
        0 => 0.0,
        1..=20 => 1.0,
        21..=60 => 0.4,
        _ => 0.0,
    }
}

fn mismatch_signal(body: Option<&str>, rating: u8) -> f64 {
    let Some(body) = body.filter(|b| !b.trim().is_empty()) else {
        return 0.0;
    };
    let lower = body.to_lowercase();
    let negative = NEGATIVE_WORDS.iter().any(|w| lower.contains(w));
    if negative && stars(rating) >= 4 {
        1.0
    } else {
        0.0
    }
}

/// Score one review against its product's stats.
pub fn score_review(review: &ReviewRecord, stats: &ProductStats) -> ReviewHeuristic {
    let body = review.body.as_deref();
    let signals = [
        ("dup", stats.duplicate_signal(review), W_DUPLICATE),
        ("author", stats.author_signal(review), W_AUTHOR),
        ("bias", stats.bias_signal(), W_BIAS),
        ("short", short_signal(body), W_SHORT),
        ("mismatch", mismatch_signal(body, review.rating), W_MISMATCH),
    ];

    let combined: f64 = signals.iter().map(|(_, value, weight)| value * weight).sum();
    let score = (combined.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0;
    let reasons = signals
        .iter()
        .filter(|(_, value, _)| *value > REASON_FLOOR)
        .map(|(name, value, _)| format!("{name}{value:.2}"))
        .collect();

    ReviewHeuristic {
        score,
        reasons,
        flag: score >= FLAG_THRESHOLD,
    }
}

/// Score every review of one product, in input order.
pub fn score_reviews(reviews: &[ReviewRecord]) -> Vec<ReviewHeuristic> {
    let stats = ProductStats::from_reviews(reviews);
    reviews.iter().map(|r| score_review(r, &stats)).collect()
}
