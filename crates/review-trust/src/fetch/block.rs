//! Sign-in wall and CAPTCHA detection.
//!
//! Detection is URL- and content-based only; it never fails.

use crate::parse::{selector, element_text};
use scraper::Html;

/// URL fragments of login, challenge and CAPTCHA pages.
const URL_TOKENS: &[&str] = &[
    "/ap/signin",
    "/ap/cvf",
    "/ap/challenge",
    "/ap/mfa",
    "/errors/validatecaptcha",
    "captcha",
];

const CAPTCHA_FORMS: &[&str] = &[
    "form[action*='validateCaptcha']",
    "input[name='cvf_captcha_input']",
];

const SIGN_IN_FORMS: &[&str] = &["form[name='signIn']", "input#ap_email"];

const TEXT_MARKERS: &[&str] = &[
    "robot check",
    "enter the characters you see below",
    "type the characters you see in this image",
    "文字を入力してください",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    /// Redirected to a login or challenge URL.
    ChallengeUrl,
    CaptchaForm,
    SignInForm,
    /// Robot-check wording in the page body or title.
    TextMarker,
}

/// Why a page is blocked, or `None` when it looks like regular content.
pub fn detect_block(final_url: &str, html: &str) -> Option<BlockReason> {
    let url = final_url.to_ascii_lowercase();
    if URL_TOKENS.iter().any(|t| url.contains(t)) {
        return Some(BlockReason::ChallengeUrl);
    }
    if html.trim().is_empty() {
        return None;
    }

    let doc = Html::parse_document(html);
    let matches = |list: &[&str]| {
        list.iter()
            .filter_map(|css| selector(css))
            .any(|sel| doc.select(&sel).next().is_some())
    };
    if matches(CAPTCHA_FORMS) {
        return Some(BlockReason::CaptchaForm);
    }
    if matches(SIGN_IN_FORMS) {
        return Some(BlockReason::SignInForm);
    }

    let title = selector("title")
        .and_then(|sel| doc.select(&sel).next().map(element_text))
        .unwrap_or_default()
        .to_lowercase();
    if title.contains("captcha") {
        return Some(BlockReason::TextMarker);
    }

    let lower = html.to_lowercase();
    if TEXT_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(BlockReason::TextMarker);
    }
    None
}

pub fn is_blocked(final_url: &str, html: &str) -> bool {
    detect_block(final_url, html).is_some()
}
