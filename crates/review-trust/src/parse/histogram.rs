//! Rating-share histogram reconstruction.
//!
//! Per-star percentages can sit in several places on a row (ARIA values on
//! meter bars, inline style widths, "68%" text, a right-hand cell). Sources
//! are tried in that order per row, and the finished buckets are nudged so
//! they sum to exactly 100.

use super::selectors::*;
use super::{element_text, first_text, selector};
use crate::normalize::{canonicalize, parse_count, parse_percent, parse_rating};
use crate::types::{HistogramSnapshot, StarShares};
use chrono::Utc;
use regex::Regex;
use scraper::{ElementRef, Html};
use std::sync::OnceLock;

fn star_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)星\s*([1-5])|(?:^|\s)([1-5])\s*(?:つ|ツ)?\s*星|([1-5])\s*-?\s*stars?")
            .expect("star regex is valid")
    })
}

fn width_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"width\s*:\s*(\d{1,3}(?:\.\d+)?)\s*%").expect("width regex is valid")
    })
}

fn inline_pct_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,3})\s*%").expect("inline percent regex is valid"))
}

const HREF_STARS: &[(&str, u8)] = &[
    ("five_star", 5),
    ("four_star", 4),
    ("three_star", 3),
    ("two_star", 2),
    ("one_star", 1),
];

/// Parse the histogram block of a product or reviews page.
///
/// Returns `None` when no star row could be read at all.
pub fn parse_histogram(html: &str) -> Option<HistogramSnapshot> {
    let doc = Html::parse_document(html);
    let shares = extract_shares(&doc);
    if shares.is_empty() {
        return None;
    }

    let mut pct = shares.0.map(|slot| slot.unwrap_or(0));
    normalize_shares(&mut pct);

    let rating_average = first_text(&doc, RATING_AVERAGE_TEXT).and_then(|t| parse_rating(&t));
    let rating_count = first_text(&doc, RATING_COUNT).and_then(|t| parse_count(&t));
    let per_star_count = match rating_count {
        Some(total) => pct.map(|p| ((p as f64 * total as f64) / 100.0).round() as u32),
        None => [0; 5],
    };

    Some(HistogramSnapshot {
        rating_average,
        rating_count,
        per_star_pct: pct,
        per_star_count,
        captured_at: Utc::now(),
    })
}

/// Read per-star shares from the first histogram row group that yields any bucket.
///
/// Buckets are normalized over the ones that were found; missing stars stay absent.
pub(crate) fn extract_shares(doc: &Html) -> StarShares {
    let containers: Vec<ElementRef<'_>> = HISTOGRAM_CONTAINERS
        .iter()
        .filter_map(|css| selector(css))
        .filter_map(|sel| doc.select(&sel).next())
        .collect();
    let roots = if containers.is_empty() {
        vec![doc.root_element()]
    } else {
        containers
    };

    for root in roots {
        for css in HISTOGRAM_ROWS {
            let Some(sel) = selector(css) else { continue };
            let mut shares = StarShares::default();
            for row in root.select(&sel) {
                let Some(star) = row_star(row) else { continue };
                if shares.get(star).is_some() {
                    continue;
                }
                if let Some(pct) = row_percent(row, star) {
                    shares.set(star, pct);
                }
            }
            if !shares.is_empty() {
                normalize_star_shares(&mut shares);
                return shares;
            }
        }
    }
    StarShares::default()
}

fn row_star(row: ElementRef<'_>) -> Option<u8> {
    // 1. Filter link in the row.
    let hrefs = std::iter::once(row)
        .chain(selector("a[href]").into_iter().flat_map(|s| row.select(&s).collect::<Vec<_>>()))
        .filter_map(|el| el.value().attr("href"));
    for href in hrefs {
        if let Some((_, star)) = HREF_STARS.iter().find(|(token, _)| href.contains(token)) {
            return Some(*star);
        }
    }

    // 2. ARIA labels.
    let labelled = std::iter::once(row).chain(
        selector("[aria-label]")
            .into_iter()
            .flat_map(|s| row.select(&s).collect::<Vec<_>>()),
    );
    for el in labelled {
        if let Some(star) = el.value().attr("aria-label").and_then(star_from_text) {
            return Some(star);
        }
    }

    // 3. Row text.
    star_from_text(&element_text(row))
}

fn star_from_text(text: &str) -> Option<u8> {
    let canonical = canonicalize(text);
    let caps = star_re().captures(&canonical)?;
    (1..=3)
        .filter_map(|i| caps.get(i))
        .next()
        .and_then(|m| m.as_str().parse().ok())
}

fn row_percent(row: ElementRef<'_>, star: u8) -> Option<u32> {
    // 1. Meter bars.
    for css in HISTOGRAM_METERS {
        let Some(sel) = selector(css) else { continue };
        for meter in row.select(&sel) {
            let attrs = meter.value();
            let value = attrs
                .attr("aria-valuenow")
                .and_then(parse_percent)
                .or_else(|| attrs.attr("value").and_then(parse_percent))
                .or_else(|| attrs.attr("style").and_then(style_width));
            if let Some(v) = value {
                return Some(to_bucket(v));
            }
        }
    }

    // 2. Width embedded anywhere in the row markup.
    if let Some(v) = style_width(&row.html()) {
        return Some(to_bucket(v));
    }

    // 3. Inline "68%" text.
    let text = canonicalize(&element_text(row));
    if let Some(v) = inline_pct_re()
        .captures_iter(&text)
        .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
        .find(|v| *v <= 100.0)
    {
        return Some(to_bucket(v));
    }

    // 4. Right-hand cell, ignoring a bare star digit.
    for css in HISTOGRAM_RIGHT_CELLS {
        let Some(sel) = selector(css) else { continue };
        for cell in row.select(&sel) {
            if let Some(v) = parse_percent(&element_text(cell)) {
                if v != star as f64 || element_text(cell).contains('%') {
                    return Some(to_bucket(v));
                }
            }
        }
    }
    None
}

fn style_width(style: &str) -> Option<f64> {
    width_re()
        .captures(style)
        .and_then(|c| c.get(1)?.as_str().parse().ok())
}

fn to_bucket(v: f64) -> u32 {
    v.round().clamp(0.0, 100.0) as u32
}

/// Make five percentages sum to exactly 100 when any is non-zero.
///
/// Each bucket is clamped to 0..=100, then the largest bucket absorbs the
/// drift. When clamping stops the largest bucket from absorbing all of it,
/// the next largest takes the rest.
pub fn normalize_shares(pct: &mut [u32; 5]) {
    let mut slots: [Option<u32>; 5] = pct.map(Some);
    normalize_slots(&mut slots);
    for (p, s) in pct.iter_mut().zip(slots) {
        *p = s.unwrap_or(0);
    }
}

/// [`normalize_shares`] over the buckets that are present.
pub fn normalize_star_shares(shares: &mut StarShares) {
    normalize_slots(&mut shares.0);
}

fn normalize_slots(slots: &mut [Option<u32>; 5]) {
    for v in slots.iter_mut().flatten() {
        *v = (*v).min(100);
    }
    let sum: i64 = slots.iter().flatten().map(|v| *v as i64).sum();
    if sum == 0 {
        return;
    }

    let mut diff = 100 - sum;
    let mut touched = [false; 5];
    while diff != 0 {
        // Largest untouched bucket; ties go to the higher star.
        let Some(idx) = (0..5)
            .filter(|i| !touched[*i] && slots[*i].is_some())
            .max_by_key(|i| (slots[*i].unwrap_or(0), *i))
        else {
            break;
        };
        touched[idx] = true;
        let current = slots[idx].unwrap_or(0) as i64;
        let adjusted = (current + diff).clamp(0, 100);
        diff -= adjusted - current;
        slots[idx] = Some(adjusted as u32);
    }
}
