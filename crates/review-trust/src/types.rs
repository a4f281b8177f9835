//! Core data types for product snapshots and review records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Per-star rating shares in percent, indexed 1★ through 5★.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarShares(pub [Option<u32>; 5]);

impl StarShares {
    /// Share for a star value in 1..=5.
    pub fn get(&self, star: u8) -> Option<u32> {
        match star {
            1..=5 => self.0[(star - 1) as usize],
            _ => None,
        }
    }

    pub fn set(&mut self, star: u8, pct: u32) {
        if (1..=5).contains(&star) {
            self.0[(star - 1) as usize] = Some(pct);
        }
    }

    /// True when all five buckets were found.
    pub fn is_complete(&self) -> bool {
        self.0.iter().all(Option::is_some)
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    /// Sum of the buckets that are present.
    pub fn sum(&self) -> u32 {
        self.0.iter().flatten().sum()
    }
}

/// A review shown inline on the product page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineReview {
    pub title: Option<String>,
    pub body: Option<String>,
    pub rating: Option<u8>,
    pub verified: bool,
    pub date_text: Option<String>,
}

impl InlineReview {
    /// A record with no extracted field carries no information.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none() && self.rating.is_none() && self.date_text.is_none()
    }
}

/// Structured capture of a single product page.
///
/// Built once per successful parse and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub product_id: Option<String>,
    pub title: Option<String>,
    pub brand: Option<String>,
    /// Price in minor currency units (yen has no subunit, so this is yen).
    pub price_minor: Option<i64>,
    pub rating_average: Option<f64>,
    pub rating_count: Option<u32>,
    pub rating_share_pct: StarShares,
    pub images: Vec<String>,
    pub feature_bullets: Vec<String>,
    pub inline_reviews: Vec<InlineReview>,
    pub captured_at: DateTime<Utc>,
    pub partial: bool,
}

impl PageSnapshot {
    /// Names of the required fields that are missing. Empty iff the snapshot is complete.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.product_id.is_none() {
            missing.push("product_id");
        }
        if self.title.is_none() {
            missing.push("title");
        }
        if self.price_minor.is_none() {
            missing.push("price");
        }
        if self.rating_average.is_none() {
            missing.push("rating_average");
        }
        if self.rating_count.is_none() {
            missing.push("rating_count");
        }
        if !self.rating_share_pct.is_complete() {
            missing.push("rating_share_pct");
        }
        if self.inline_reviews.is_empty() {
            missing.push("inline_reviews");
        }
        missing
    }

    /// Whether the page yielded anything worth keeping as a degraded capture.
    pub fn has_content(&self) -> bool {
        self.product_id.is_some()
            || self.title.is_some()
            || self.price_minor.is_some()
            || self.rating_average.is_some()
    }
}

/// One review collected from a reviews listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    /// Site review id, or a fingerprint-derived id when the site gave none.
    pub external_id: String,
    /// Star rating 1..=5, or 0 when unknown.
    pub rating: u8,
    pub title: Option<String>,
    pub body: Option<String>,
    pub author: Option<String>,
    pub posted_at: Option<NaiveDate>,
    pub collected_at: DateTime<Utc>,
    pub helpful_votes: u32,
    pub source_url: Option<String>,
    #[serde(default)]
    pub verified: bool,
    /// Content fingerprint, only set when the site provided no review id.
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl ReviewRecord {
    /// Minimal record used by tests and callers that only know the rating and text.
    pub fn new(external_id: impl Into<String>, rating: u8, body: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            rating: rating.min(5),
            title: None,
            body: Some(body.into()),
            author: None,
            posted_at: None,
            collected_at: Utc::now(),
            helpful_votes: 0,
            source_url: None,
            verified: false,
            fingerprint: None,
        }
    }

    /// Day the review is attributed to for surge detection.
    pub fn day(&self) -> NaiveDate {
        self.posted_at.unwrap_or_else(|| self.collected_at.date_naive())
    }
}

/// Rating summary derived from the histogram block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub rating_average: Option<f64>,
    pub rating_count: Option<u32>,
    /// Normalized percentages 1★..5★, summing to 100 when any is non-zero.
    pub per_star_pct: [u32; 5],
    /// Counts estimated from percentages and the total count.
    pub per_star_count: [u32; 5],
    pub captured_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> PageSnapshot {
        PageSnapshot {
            product_id: Some("B0TEST0001".into()),
            title: Some("Title".into()),
            brand: None,
            price_minor: Some(1980),
            rating_average: Some(4.2),
            rating_count: Some(120),
            rating_share_pct: StarShares([Some(5), Some(5), Some(10), Some(20), Some(60)]),
            images: vec![],
            feature_bullets: vec![],
            inline_reviews: vec![InlineReview {
                title: Some("ok".into()),
                body: None,
                rating: Some(4),
                verified: false,
                date_text: None,
            }],
            captured_at: Utc::now(),
            partial: false,
        }
    }

    #[test]
    fn test_missing_fields_complete() {
        assert!(snapshot().missing_fields().is_empty());
    }

    #[test]
    fn test_missing_fields_lists_each_gap() {
        let mut s = snapshot();
        s.price_minor = None;
        s.rating_share_pct.0[2] = None;
        s.inline_reviews.clear();
        assert_eq!(s.missing_fields(), vec!["price", "rating_share_pct", "inline_reviews"]);
    }

    #[test]
    fn test_star_shares_accessors() {
        let mut shares = StarShares::default();
        assert!(shares.is_empty());
        shares.set(5, 70);
        shares.set(9, 1);
        assert_eq!(shares.get(5), Some(70));
        assert_eq!(shares.get(0), None);
        assert_eq!(shares.sum(), 70);
        assert!(!shares.is_complete());
    }

    #[test]
    fn test_review_day_falls_back_to_collected() {
        let mut r = ReviewRecord::new("R1", 5, "body");
        assert_eq!(r.day(), r.collected_at.date_naive());
        let d = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        r.posted_at = Some(d);
        assert_eq!(r.day(), d);
    }
}
