//! Product page → [`PageSnapshot`].

use super::histogram::extract_shares;
use super::selectors::*;
use super::{element_text, first_attr_in, first_text, first_text_in, matches_any, review_stars, selector};
use crate::normalize::{canonicalize, collapse_whitespace, parse_count, parse_yen_to_minor};
use crate::types::{InlineReview, PageSnapshot};
use chrono::Utc;
use regex::Regex;
use scraper::Html;
use std::sync::OnceLock;

fn asin_bullet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"ASIN\s*[:：]\s*([A-Z0-9]{10})").expect("asin bullet regex is valid")
    })
}

fn asin_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/(?:dp|gp/product)/([A-Z0-9]{10})").expect("asin path regex is valid")
    })
}

/// Parse a product page. Never fails; missing fields leave the snapshot `partial`.
pub fn parse_product_page(html: &str) -> PageSnapshot {
    let doc = Html::parse_document(html);

    let product_id = extract_asin(&doc);
    let title = first_text(&doc, TITLE);
    let brand = extract_brand(&doc);
    let price_minor = first_text(&doc, PRICE).and_then(|t| parse_yen_to_minor(&t));
    let rating_average = extract_rating_average(&doc);
    let rating_count = first_text(&doc, RATING_COUNT).and_then(|t| parse_count(&t));
    let rating_share_pct = extract_shares(&doc);
    let images = extract_images(&doc);
    let feature_bullets = extract_bullets(&doc);
    let inline_reviews = extract_inline_reviews(&doc);

    let mut snapshot = PageSnapshot {
        product_id,
        title,
        brand,
        price_minor,
        rating_average,
        rating_count,
        rating_share_pct,
        images,
        feature_bullets,
        inline_reviews,
        captured_at: Utc::now(),
        partial: false,
    };
    snapshot.partial = !snapshot.missing_fields().is_empty();
    snapshot
}

fn is_asin(candidate: &str) -> bool {
    candidate.len() == 10
        && candidate
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

fn extract_asin(doc: &Html) -> Option<String> {
    let root = doc.root_element();

    // ── Hidden form input ──
    if let Some(v) = first_attr_in(root, ASIN_INPUT, "value") {
        if is_asin(&v) {
            return Some(v);
        }
    }

    // ── Detail bullets ──
    for css in DETAIL_BULLET_ROWS {
        let Some(sel) = selector(css) else { continue };
        for li in doc.select(&sel) {
            let text = canonicalize(&element_text(li));
            if let Some(caps) = asin_bullet_re().captures(&text) {
                if let Some(m) = caps.get(1) {
                    return Some(m.as_str().to_string());
                }
            }
        }
    }

    // ── Product details table ──
    if let (Some(th), Some(td)) = (selector("th"), selector("td")) {
        for css in DETAIL_TABLE_ROWS {
            let Some(sel) = selector(css) else { continue };
            for tr in doc.select(&sel) {
                let label = tr.select(&th).next().map(element_text).unwrap_or_default();
                if !label.contains("ASIN") {
                    continue;
                }
                if let Some(value) = tr.select(&td).next().map(element_text) {
                    if is_asin(&value) {
                        return Some(value);
                    }
                }
            }
        }
    }

    // ── Canonical link ──
    selector(CANONICAL_LINK)
        .and_then(|sel| doc.select(&sel).next())
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| asin_path_re().captures(href))
        .and_then(|caps| caps.get(1).map(|m| m.as_str().to_string()))
}

fn extract_brand(doc: &Html) -> Option<String> {
    let mut text = first_text(doc, BRAND)?;
    for prefix in BRAND_PREFIXES {
        if let Some(rest) = text.strip_prefix(prefix) {
            text = rest.trim().to_string();
        }
    }
    for suffix in BRAND_SUFFIXES {
        if let Some(rest) = text.strip_suffix(suffix) {
            text = rest.trim().to_string();
        }
    }
    let text = collapse_whitespace(&text);
    (!text.is_empty()).then_some(text)
}

fn extract_rating_average(doc: &Html) -> Option<f64> {
    let root = doc.root_element();
    let from_attr = RATING_AVERAGE_ATTR
        .iter()
        .find_map(|&(css, attr)| first_attr_in(root, &[css], attr));
    from_attr
        .or_else(|| first_text(doc, RATING_AVERAGE_TEXT))
        .and_then(|t| super::star_value(&t))
        .filter(|v| (0.0..=5.0).contains(v))
}

fn extract_images(doc: &Html) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |url: &str| {
        let url = url.trim();
        if url.is_empty() || url.starts_with("data:") {
            return;
        }
        if !out.iter().any(|u| u == url) {
            out.push(url.to_string());
        }
    };

    for css in IMAGES {
        let Some(sel) = selector(css) else { continue };
        for img in doc.select(&sel) {
            let attrs = img.value();
            for attr in IMAGE_ATTRS {
                if let Some(v) = attrs.attr(attr) {
                    push(v);
                }
            }
            // {"https://…/a.jpg":[500,500], …}
            if let Some(raw) = attrs.attr("data-a-dynamic-image") {
                if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(raw) {
                    for key in map.keys() {
                        push(key);
                    }
                }
            }
        }
    }
    out
}

fn extract_bullets(doc: &Html) -> Vec<String> {
    for css in FEATURE_BULLETS {
        let Some(sel) = selector(css) else { continue };
        let bullets: Vec<String> = doc
            .select(&sel)
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect();
        if !bullets.is_empty() {
            return bullets;
        }
    }
    Vec::new()
}

fn extract_inline_reviews(doc: &Html) -> Vec<InlineReview> {
    for css in INLINE_REVIEW_GROUPS {
        let Some(sel) = selector(css) else { continue };
        let reviews: Vec<InlineReview> = doc
            .select(&sel)
            .map(|block| InlineReview {
                title: first_text_in(block, INLINE_TITLE),
                body: first_text_in(block, INLINE_BODY),
                rating: review_stars(block, REVIEW_STARS),
                verified: matches_any(block, &[REVIEW_VERIFIED]),
                date_text: first_text_in(block, REVIEW_DATE),
            })
            .filter(|r| !r.is_empty())
            .collect();
        if !reviews.is_empty() {
            return reviews;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_PAGE: &str = r#"
    <html><head><link rel="canonical" href="https://www.amazon.co.jp/dp/B0CANON001"></head>
    <body>
      <input type="hidden" id="ASIN" value="B0TEST1234">
      <span id="productTitle">  テスト 商品  </span>
      <a id="bylineInfo">ブランド: ACME</a>
      <div id="corePriceDisplay_desktop_feature_div"><span class="a-offscreen">￥1,980</span></div>
      <span id="acrPopover" title="5つ星のうち4.3"></span>
      <span id="acrCustomerReviewText">1,234個の評価</span>
      <div id="cm_cr_dp_d_rating_histogram"><ul id="histogramTable">
        <li><a href="?filterByStar=five_star">星5つ <div class="a-meter" aria-valuenow="60"></div></a></li>
        <li><a href="?filterByStar=four_star">星4つ <div class="a-meter" aria-valuenow="20"></div></a></li>
        <li><a href="?filterByStar=three_star">星3つ <div class="a-meter" aria-valuenow="10"></div></a></li>
        <li><a href="?filterByStar=two_star">星2つ <div class="a-meter" aria-valuenow="5"></div></a></li>
        <li><a href="?filterByStar=one_star">星1つ <div class="a-meter" aria-valuenow="4"></div></a></li>
      </ul></div>
      <div id="imgTagWrapperId"><img id="landingImage" src="https://img/a.jpg"
        data-old-hires="https://img/a-large.jpg"
        data-a-dynamic-image='{"https://img/a.jpg":[500,500],"https://img/b.jpg":[300,300]}'></div>
      <div id="feature-bullets"><ul class="a-unordered-list">
        <li><span class="a-list-item"> 軽量 </span></li>
        <li><span class="a-list-item">防水</span></li>
        <li><span class="a-list-item">  </span></li>
      </ul></div>
      <div id="cm-cr-dp-review-list">
        <div data-hook="review">
          <a data-hook="review-title"><i><span class="a-icon-alt">5つ星のうち5.0</span></i>
            <span class="a-letter-space"></span><span>最高です</span></a>
          <i data-hook="review-star-rating"><span class="a-icon-alt">5つ星のうち5.0</span></i>
          <span data-hook="review-date">2024年1月5日に日本でレビュー済み</span>
          <span data-hook="avp-badge">Amazonで購入</span>
          <div data-hook="review-body"><span>とても良い商品でした。</span></div>
        </div>
        <div data-hook="review"></div>
      </div>
    </body></html>"#;

    #[test]
    fn test_full_page_is_complete() {
        let snap = parse_product_page(FULL_PAGE);
        assert_eq!(snap.product_id.as_deref(), Some("B0TEST1234"));
        assert_eq!(snap.title.as_deref(), Some("テスト 商品"));
        assert_eq!(snap.brand.as_deref(), Some("ACME"));
        assert_eq!(snap.price_minor, Some(1980));
        assert_eq!(snap.rating_average, Some(4.3));
        assert_eq!(snap.rating_count, Some(1234));
        assert_eq!(snap.rating_share_pct.sum(), 100);
        assert_eq!(snap.rating_share_pct.get(5), Some(61));
        assert_eq!(
            snap.images,
            vec![
                "https://img/a-large.jpg".to_string(),
                "https://img/a.jpg".to_string(),
                "https://img/b.jpg".to_string(),
            ]
        );
        assert_eq!(snap.feature_bullets, vec!["軽量".to_string(), "防水".to_string()]);
        assert_eq!(snap.inline_reviews.len(), 1);
        let review = &snap.inline_reviews[0];
        assert_eq!(review.title.as_deref(), Some("最高です"));
        assert_eq!(review.rating, Some(5));
        assert!(review.verified);
        assert!(!snap.partial);
    }

    #[test]
    fn test_missing_price_marks_partial() {
        let html = FULL_PAGE.replace("￥1,980", "");
        let snap = parse_product_page(&html);
        assert_eq!(snap.price_minor, None);
        assert!(snap.partial);
        assert_eq!(snap.missing_fields(), vec!["price"]);
    }

    #[test]
    fn test_missing_histogram_bucket_marks_partial() {
        let html = FULL_PAGE.replace(
            r#"<li><a href="?filterByStar=one_star">星1つ <div class="a-meter" aria-valuenow="4"></div></a></li>"#,
            "",
        );
        let snap = parse_product_page(&html);
        assert_eq!(snap.rating_share_pct.get(1), None);
        assert_eq!(snap.rating_share_pct.sum(), 100);
        assert!(snap.partial);
    }

    #[test]
    fn test_asin_fallbacks() {
        let bullets = r#"<div id="detailBullets_feature_div"><ul>
            <li><span>ASIN ： B0BULLET01</span></li></ul></div>"#;
        assert_eq!(parse_product_page(bullets).product_id.as_deref(), Some("B0BULLET01"));

        let table = r#"<table id="productDetails_detailBullets_sections1">
            <tr><th>ASIN</th><td> B0TABLE001 </td></tr></table>"#;
        assert_eq!(parse_product_page(table).product_id.as_deref(), Some("B0TABLE001"));

        let canonical = r#"<html><head><link rel="canonical" href="https://x/y/dp/B0CANON001/ref=1"></head></html>"#;
        assert_eq!(parse_product_page(canonical).product_id.as_deref(), Some("B0CANON001"));
    }

    #[test]
    fn test_garbage_input_is_total() {
        for html in ["", "<<<>>>", "<html><body><div id=\"productTitle\"></div></body></html>"] {
            let snap = parse_product_page(html);
            assert!(snap.partial);
            assert_eq!(snap.title, None);
            assert!(!snap.has_content());
        }
    }

    #[test]
    fn test_inline_review_group_first_match_wins() {
        let html = r#"
          <div id="cm-cr-dp-review-list"><div data-hook="review">
            <span data-hook="review-title">primary</span></div></div>
          <div id="reviewsMedley"><div data-hook="review">
            <span data-hook="review-title">medley</span></div></div>"#;
        let snap = parse_product_page(html);
        let titles: Vec<_> = snap.inline_reviews.iter().filter_map(|r| r.title.clone()).collect();
        assert_eq!(titles, vec!["primary".to_string()]);
    }
}
