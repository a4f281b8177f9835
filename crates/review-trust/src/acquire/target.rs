//! Target resolution: product URL or bare ASIN → ASIN and page URLs.

use regex::Regex;
use std::sync::OnceLock;

fn path_asin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/(?:dp|gp/product|product-reviews)/([A-Z0-9]{10})(?:[/?#]|$)")
            .expect("path asin regex is valid")
    })
}

fn query_asin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[?&]asin=([A-Z0-9]{10})(?:&|#|$)").expect("query asin regex is valid"))
}

fn bare_asin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z0-9]{10}$").expect("bare asin regex is valid"))
}

/// ASIN from a product/reviews URL, an `asin=` query, or a bare identifier.
pub fn resolve_asin(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Some(caps) = path_asin_re().captures(input) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = query_asin_re().captures(input) {
        return Some(caps[1].to_string());
    }
    let upper = input.to_ascii_uppercase();
    bare_asin_re().is_match(&upper).then_some(upper)
}

fn trim_base(base: &str) -> &str {
    base.trim_end_matches('/')
}

/// Newest-first listing of all reviews.
pub fn reviews_url(base: &str, asin: &str) -> String {
    format!(
        "{}/product-reviews/{asin}/?reviewerType=all_reviews&sortBy=recent",
        trim_base(base)
    )
}

pub fn product_url(base: &str, asin: &str) -> String {
    format!("{}/dp/{asin}", trim_base(base))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_from_urls() {
        assert_eq!(
            resolve_asin("https://www.amazon.co.jp/Some-Item/dp/B0ABCDEF12/ref=sr_1_1?th=1"),
            Some("B0ABCDEF12".into())
        );
        assert_eq!(
            resolve_asin("https://www.amazon.co.jp/gp/product/4061234567"),
            Some("4061234567".into())
        );
        assert_eq!(
            resolve_asin("https://www.amazon.co.jp/product-reviews/B0ABCDEF12/?sortBy=recent"),
            Some("B0ABCDEF12".into())
        );
        assert_eq!(
            resolve_asin("https://www.amazon.co.jp/gp/aw/d?asin=B0ABCDEF12&ref=x"),
            Some("B0ABCDEF12".into())
        );
    }

    #[test]
    fn test_resolve_bare() {
        assert_eq!(resolve_asin(" b0abcdef12 "), Some("B0ABCDEF12".into()));
        assert_eq!(resolve_asin("B0ABC"), None);
        assert_eq!(resolve_asin("https://example.com/nothing"), None);
        assert_eq!(resolve_asin(""), None);
    }

    #[test]
    fn test_urls() {
        assert_eq!(
            reviews_url("https://www.amazon.co.jp/", "B0ABCDEF12"),
            "https://www.amazon.co.jp/product-reviews/B0ABCDEF12/?reviewerType=all_reviews&sortBy=recent"
        );
        assert_eq!(
            product_url("http://127.0.0.1:8080", "B0ABCDEF12"),
            "http://127.0.0.1:8080/dp/B0ABCDEF12"
        );
    }
}
