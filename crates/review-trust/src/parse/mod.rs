//! HTML extraction for product pages, rating histograms, and review listings.
//!
//! All parsers are pure and total: malformed input yields absent fields,
//! never an error.

pub mod histogram;
pub mod product;
pub mod reviews;
pub mod selectors;

pub use histogram::{normalize_shares, parse_histogram};
pub use product::parse_product_page;
pub use reviews::parse_review_list;

use crate::normalize::{canonicalize, collapse_whitespace, parse_rating};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

fn out_of_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"うち\s*(\d+(?:\.\d+)?)|(\d+(?:\.\d+)?)\s*(?:out of|/)")
            .expect("out-of regex is valid")
    })
}

fn star_class_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"a-star-(?:mini-|medium-)?([1-5])").expect("star class regex is valid"))
}

/// Parse a selector, skipping invalid ones instead of failing.
pub(crate) fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

/// Visible text of an element with whitespace collapsed.
pub(crate) fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

/// Text of the first element, across the selector list, whose text is non-empty.
pub(crate) fn first_text_in(root: ElementRef<'_>, selectors: &[&str]) -> Option<String> {
    for css in selectors {
        let Some(sel) = selector(css) else { continue };
        for el in root.select(&sel) {
            let text = element_text(el);
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

/// Document-level variant of [`first_text_in`].
pub(crate) fn first_text(doc: &Html, selectors: &[&str]) -> Option<String> {
    first_text_in(doc.root_element(), selectors)
}

/// First non-blank value of `attr` on an element matching one of the selectors.
pub(crate) fn first_attr_in(root: ElementRef<'_>, selectors: &[&str], attr: &str) -> Option<String> {
    for css in selectors {
        let Some(sel) = selector(css) else { continue };
        for el in root.select(&sel) {
            if let Some(v) = el.value().attr(attr) {
                let v = v.trim();
                if !v.is_empty() {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

/// Whether any selector in the list matches inside `root`.
pub(crate) fn matches_any(root: ElementRef<'_>, selectors: &[&str]) -> bool {
    selectors
        .iter()
        .filter_map(|css| selector(css))
        .any(|sel| root.select(&sel).next().is_some())
}

/// Rating value from star text: `5つ星のうち4.0` and `4.0 out of 5 stars` both give 4.0.
pub(crate) fn star_value(text: &str) -> Option<f64> {
    let canonical = canonicalize(text);
    if let Some(caps) = out_of_re().captures(&canonical) {
        if let Some(v) = caps
            .get(1)
            .or_else(|| caps.get(2))
            .and_then(|m| m.as_str().parse::<f64>().ok())
        {
            return Some(v);
        }
    }
    parse_rating(&canonical)
}

/// Star rating of a review block, clamped to 1..=5.
///
/// Tries the star text first, then an `a-star-N` icon class.
pub(crate) fn review_stars(root: ElementRef<'_>, selectors: &[&str]) -> Option<u8> {
    for css in selectors {
        let Some(sel) = selector(css) else { continue };
        for el in root.select(&sel) {
            if let Some(v) = star_value(&element_text(el)) {
                return Some(v.round().clamp(1.0, 5.0) as u8);
            }
            let class_star = el
                .value()
                .attr("class")
                .and_then(|c| star_class_re().captures(c))
                .and_then(|c| c.get(1)?.as_str().parse::<u8>().ok());
            if class_star.is_some() {
                return class_star;
            }
        }
    }
    None
}
