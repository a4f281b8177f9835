//! Reviews listing → [`ReviewRecord`]s.

use super::selectors::*;
use super::{first_attr_in, first_text_in, matches_any, review_stars, selector};
use crate::fingerprint::review_fingerprint;
use crate::normalize::canonicalize;
use crate::types::ReviewRecord;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::OnceLock;

/// Site root used to absolutize review links when the caller does not supply one.
pub const DEFAULT_BASE_URL: &str = "https://www.amazon.co.jp";

const REVIEW_ID_PREFIX: &str = "customer_review-";

fn jp_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{4})年\s*(\d{1,2})月\s*(\d{1,2})日").expect("jp date regex is valid")
    })
}

fn digits_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{1,7}").expect("digits regex is valid"))
}

const EN_DATE_FORMATS: &[&str] = &["%B %d, %Y", "%d %B %Y", "%b %d, %Y", "%d %b %Y", "%Y-%m-%d"];

/// Parse a reviews listing against the default site root.
pub fn parse_review_list(html: &str) -> Vec<ReviewRecord> {
    parse_review_list_with_base(html, DEFAULT_BASE_URL)
}

/// Parse a reviews listing; relative review links are resolved against `base_url`.
///
/// Selector groups are tried in order and the first group producing at least
/// one non-empty record is used on its own.
pub fn parse_review_list_with_base(html: &str, base_url: &str) -> Vec<ReviewRecord> {
    let doc = Html::parse_document(html);
    let base = url::Url::parse(base_url).ok();
    let collected_at = Utc::now();

    for css in REVIEW_LIST_GROUPS {
        let Some(sel) = selector(css) else { continue };
        let records: Vec<ReviewRecord> = doc
            .select(&sel)
            .enumerate()
            .filter_map(|(i, block)| parse_block(block, i, base.as_ref(), collected_at))
            .collect();
        if !records.is_empty() {
            return records;
        }
    }
    Vec::new()
}

fn parse_block(
    block: ElementRef<'_>,
    index: usize,
    base: Option<&url::Url>,
    collected_at: DateTime<Utc>,
) -> Option<ReviewRecord> {
    let title = first_text_in(block, REVIEW_TITLE);
    let body = first_text_in(block, REVIEW_BODY);
    let author = first_text_in(block, REVIEW_AUTHOR);
    let rating = review_stars(block, REVIEW_STARS).unwrap_or(0);

    if title.is_none() && body.is_none() && author.is_none() && rating == 0 {
        return None;
    }

    let posted_at = first_text_in(block, REVIEW_DATE).and_then(|t| parse_review_date(&t));
    let helpful_votes = first_text_in(block, REVIEW_HELPFUL)
        .map(|t| parse_helpful_votes(&t))
        .unwrap_or(0);
    let source_url = first_attr_in(block, REVIEW_TITLE_LINK, "href").map(|href| absolutize(base, &href));
    let verified = matches_any(block, &[REVIEW_VERIFIED]);

    let site_id = block
        .value()
        .attr("data-review-id")
        .or_else(|| block.value().attr("id"))
        .map(|id| id.trim().trim_start_matches(REVIEW_ID_PREFIX).to_string())
        .filter(|id| !id.is_empty());

    let (external_id, fingerprint) = match site_id {
        Some(id) => (id, None),
        None => {
            let fp = review_fingerprint(
                title.as_deref(),
                body.as_deref(),
                author.as_deref(),
                posted_at,
            );
            let id = match &fp {
                Some(fp) => format!("fp-{}", &fp[..16]),
                None => format!("idx-{index}"),
            };
            (id, fp)
        }
    };

    Some(ReviewRecord {
        external_id,
        rating,
        title,
        body,
        author,
        posted_at,
        collected_at,
        helpful_votes,
        source_url,
        verified,
        fingerprint,
    })
}

fn absolutize(base: Option<&url::Url>, href: &str) -> String {
    match base.and_then(|b| b.join(href).ok()) {
        Some(u) => u.to_string(),
        None => href.to_string(),
    }
}

/// `2023年10月1日に日本でレビュー済み`, `Reviewed in Japan on October 1, 2023`, `1 October 2023`, ISO.
pub fn parse_review_date(text: &str) -> Option<NaiveDate> {
    let canonical = canonicalize(text);

    if let Some(caps) = jp_date_re().captures(&canonical) {
        let y = caps.get(1)?.as_str().parse().ok()?;
        let m = caps.get(2)?.as_str().parse().ok()?;
        let d = caps.get(3)?.as_str().parse().ok()?;
        return NaiveDate::from_ymd_opt(y, m, d);
    }

    let lower = canonical.to_ascii_lowercase();
    let date_part = match lower.rfind(" on ") {
        Some(idx) => canonical[idx + 4..].trim(),
        None => canonical.trim(),
    };
    EN_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// `One person found this helpful` → 1, `12 people…` / `12人のお客様…` → 12.
pub fn parse_helpful_votes(text: &str) -> u32 {
    let canonical = canonicalize(text);
    if canonical.to_ascii_lowercase().starts_with("one person") {
        return 1;
    }
    digits_re()
        .find(&canonical.replace(',', ""))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
    <div id="cm_cr-review_list">
      <li data-hook="review" id="R1ABC">
        <span class="a-profile-name">Taro</span>
        <i data-hook="review-star-rating"><span class="a-icon-alt">5つ星のうち5.0</span></i>
        <a data-hook="review-title" href="/gp/customer-reviews/R1ABC/ref=cm">
          <i><span class="a-icon-alt">5つ星のうち5.0</span></i><span class="a-letter-space"></span>
          <span>最高</span></a>
        <span data-hook="review-date">2023年10月1日に日本でレビュー済み</span>
        <span data-hook="avp-badge">Amazonで購入</span>
        <span data-hook="review-body"><span>とても良い。</span></span>
        <span data-hook="helpful-vote-statement">12人のお客様がこれが役に立ったと考えています</span>
      </li>
      <li data-hook="review" data-review-id="R2DEF">
        <span class="a-profile-name">Hanako</span>
        <i data-hook="cmps-review-star-rating"><span class="a-icon-alt">2.0 out of 5 stars</span></i>
        <span data-hook="review-title">Meh</span>
        <span data-hook="review-date">Reviewed in Japan on October 3, 2023</span>
        <span data-hook="review-body">Broke after a week.</span>
        <span data-hook="helpful-vote-statement">One person found this helpful</span>
      </li>
      <li data-hook="review"></li>
    </div>"#;

    #[test]
    fn test_parse_listing_fields() {
        let reviews = parse_review_list(LISTING);
        assert_eq!(reviews.len(), 2);

        let r1 = &reviews[0];
        assert_eq!(r1.external_id, "R1ABC");
        assert_eq!(r1.rating, 5);
        assert_eq!(r1.title.as_deref(), Some("最高"));
        assert_eq!(r1.body.as_deref(), Some("とても良い。"));
        assert_eq!(r1.author.as_deref(), Some("Taro"));
        assert_eq!(r1.posted_at, NaiveDate::from_ymd_opt(2023, 10, 1));
        assert_eq!(r1.helpful_votes, 12);
        assert!(r1.verified);
        assert_eq!(
            r1.source_url.as_deref(),
            Some("https://www.amazon.co.jp/gp/customer-reviews/R1ABC/ref=cm")
        );
        assert_eq!(r1.fingerprint, None);

        let r2 = &reviews[1];
        assert_eq!(r2.external_id, "R2DEF");
        assert_eq!(r2.rating, 2);
        assert_eq!(r2.posted_at, NaiveDate::from_ymd_opt(2023, 10, 3));
        assert_eq!(r2.helpful_votes, 1);
        assert!(!r2.verified);
    }

    #[test]
    fn test_missing_id_uses_fingerprint() {
        let html = r#"<div data-hook="review">
            <span data-hook="review-body">no id here</span></div>"#;
        let reviews = parse_review_list(html);
        assert_eq!(reviews.len(), 1);
        let fp = reviews[0].fingerprint.clone().expect("fingerprint");
        assert_eq!(reviews[0].external_id, format!("fp-{}", &fp[..16]));
        assert_eq!(reviews[0].rating, 0);
    }

    #[test]
    fn test_customer_review_prefix_stripped() {
        let html = r#"<div data-hook="review" id="customer_review-RXYZ">
            <span data-hook="review-title">t</span></div>"#;
        assert_eq!(parse_review_list(html)[0].external_id, "RXYZ");
    }

    #[test]
    fn test_empty_and_garbage() {
        assert!(parse_review_list("").is_empty());
        assert!(parse_review_list("<li data-hook='review'></li>").is_empty());
        assert!(parse_review_list("</div><<").is_empty());
    }

    #[test]
    fn test_parse_review_date_formats() {
        let d = NaiveDate::from_ymd_opt(2023, 10, 1);
        assert_eq!(parse_review_date("２０２３年１０月１日"), d);
        assert_eq!(parse_review_date("Reviewed in the United States on October 1, 2023"), d);
        assert_eq!(parse_review_date("1 October 2023"), d);
        assert_eq!(parse_review_date("2023-10-01"), d);
        assert_eq!(parse_review_date("yesterday"), None);
    }

    #[test]
    fn test_parse_helpful_votes() {
        assert_eq!(parse_helpful_votes("One person found this helpful"), 1);
        assert_eq!(parse_helpful_votes("1,024 people found this helpful"), 1024);
        assert_eq!(parse_helpful_votes("役に立った"), 0);
    }
}
