//! Content fingerprints for reviews that arrive without a site id.

use crate::normalize::comparison_form;
use chrono::{Datelike, NaiveDate};
use sha2::{Digest, Sha256};

/// Days from 0001-01-01 to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

fn hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// SHA-256 over `title|body|reviewer|epoch_day` in comparison form.
///
/// Blank parts are skipped. Returns `None` when every part is blank.
pub fn review_fingerprint(
    title: Option<&str>,
    body: Option<&str>,
    reviewer: Option<&str>,
    day: Option<NaiveDate>,
) -> Option<String> {
    let norm = |s: Option<&str>| s.map(comparison_form).filter(|s| !s.is_empty());

    let mut parts: Vec<String> = Vec::new();
    if let Some(t) = norm(title) {
        parts.push(t);
    }
    if let Some(b) = norm(body) {
        parts.push(b);
    }
    if let Some(r) = norm(reviewer) {
        parts.push(r);
    }
    if parts.is_empty() {
        return None;
    }
    if let Some(d) = day {
        parts.push((d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE).to_string());
    }

    Some(hex_lower(&Sha256::digest(parts.join("|").as_bytes())))
}
