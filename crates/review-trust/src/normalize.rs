//! Text and number normalization shared by every parser.
//!
//! Page text arrives with full-width digits, locale punctuation, and
//! currency symbols. Everything numeric goes through [`canonicalize`]
//! first; a value that still fails to parse is absent, never an error.

use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

fn decimal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+\.\d+").expect("decimal regex is valid"))
}

fn integer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("integer regex is valid"))
}

fn percent_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*%").expect("percent regex is valid"))
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number regex is valid"))
}

/// NFKC-fold the text, map the remaining full-width punctuation, and collapse whitespace.
pub fn canonicalize(input: &str) -> String {
    let folded: String = input
        .nfkc()
        .map(|c| match c {
            '％' => '%',
            '，' => ',',
            '．' => '.',
            '￥' => '¥',
            _ => c,
        })
        .collect();
    collapse_whitespace(&folded)
}

/// Collapse runs of whitespace to a single space and trim.
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Form used when comparing free text: NFKD, no combining marks, lower case, single spaces.
pub fn comparison_form(input: &str) -> String {
    let stripped: String = input
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    collapse_whitespace(&stripped)
}

/// `"￥1,980"` → `1980`. Digits only; anything without digits is absent.
pub fn parse_yen_to_minor(input: &str) -> Option<i64> {
    let canonical = canonicalize(input);
    // Drop a fractional part such as "1,980.00" before keeping digits.
    let integral = match canonical.find('.') {
        Some(idx) if canonical[idx + 1..].chars().all(|c| c.is_ascii_digit()) => &canonical[..idx],
        _ => canonical.as_str(),
    };
    let digits: String = integral.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// First decimal number in the text (a comma counts as the decimal point), else the first integer.
pub fn parse_rating(input: &str) -> Option<f64> {
    let canonical = canonicalize(input).replace(',', ".");
    if let Some(m) = decimal_re().find(&canonical) {
        return m.as_str().parse().ok();
    }
    integer_re()
        .find(&canonical)
        .and_then(|m| m.as_str().parse().ok())
}

/// All digits in the text as one count: `"1,234個の評価"` → `1234`.
pub fn parse_count(input: &str) -> Option<u32> {
    let digits: String = canonicalize(input)
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// A number directly followed by `%` when present, otherwise the first number.
pub fn parse_percent(input: &str) -> Option<f64> {
    let canonical = canonicalize(input);
    if let Some(caps) = percent_re().captures(&canonical) {
        return caps.get(1).and_then(|m| m.as_str().parse().ok());
    }
    number_re()
        .find(&canonical)
        .and_then(|m| m.as_str().parse().ok())
}

/// Mask an email address for logs: `alice@example.com` → `al***@example.com`.
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let keep: String = local.chars().take(2).collect();
            format!("{keep}***@{domain}")
        }
        None => "***".to_string(),
    }
}
