//! Selector tables, in priority order.
//!
//! Each list is tried front to back and the first non-empty match wins.
//! New markup variants are added here, not in the extraction code.

// ── Product page ──

pub const PRICE: &[&str] = &[
    "#corePriceDisplay_desktop_feature_div .a-offscreen",
    "#corePriceDisplay_desktop_feature_div span[data-a-color=\"price\"] span.a-offscreen",
    "#apex_desktop .a-price .a-offscreen",
    "#priceblock_ourprice",
    "#priceblock_dealprice",
    "#price_inside_buybox",
];

pub const ASIN_INPUT: &[&str] = &["input#ASIN", "input[name=\"ASIN\"]"];

pub const DETAIL_BULLET_ROWS: &[&str] = &["#detailBullets_feature_div li"];

pub const DETAIL_TABLE_ROWS: &[&str] = &[
    "#productDetails_detailBullets_sections1 tr",
    "#productDetails_techSpec_section_1 tr",
];

pub const CANONICAL_LINK: &str = "link[rel=\"canonical\"]";

pub const TITLE: &[&str] = &["#productTitle", "#title", "h1#title span"];

pub const BRAND: &[&str] = &["#bylineInfo", "#brand", "a#brand"];

/// Prefixes stripped from the byline text.
pub const BRAND_PREFIXES: &[&str] = &["ブランド:", "ブランド：", "Brand:", "Visit the"];
/// Suffixes stripped from the byline text.
pub const BRAND_SUFFIXES: &[&str] = &["のストアを表示", "Store"];

/// Rating average carried in an attribute.
pub const RATING_AVERAGE_ATTR: &[(&str, &str)] = &[
    ("#acrPopover", "title"),
    ("span[data-hook=\"rating-out-of-text\"]", "aria-label"),
];

/// Rating average carried in element text.
pub const RATING_AVERAGE_TEXT: &[&str] = &[
    "span[data-hook=\"rating-out-of-text\"]",
    "#acrPopover span.a-icon-alt",
    "i[data-hook=\"average-star-rating\"] span",
];

pub const RATING_COUNT: &[&str] = &[
    "#acrCustomerReviewText",
    "[data-hook=\"total-review-count\"]",
    "#acrCustomerReviewLink span",
];

pub const IMAGES: &[&str] = &[
    "#imgTagWrapperId img#landingImage",
    "#imageBlock_feature_div img",
    "#main-image-container img",
];

/// Image attributes in preference order; `data-a-dynamic-image` is handled separately.
pub const IMAGE_ATTRS: &[&str] = &["data-old-hires", "data-src", "src"];

pub const FEATURE_BULLETS: &[&str] = &[
    "#feature-bullets ul.a-unordered-list li span.a-list-item",
    "#feature-bullets ul li",
];

pub const INLINE_REVIEW_GROUPS: &[&str] = &[
    "#cm-cr-dp-review-list div[data-hook=\"review\"]",
    "#reviewsMedley div[data-hook=\"review\"]",
];

pub const INLINE_TITLE: &[&str] = &[
    "a[data-hook=\"review-title\"] span:not(.a-icon-alt):not(.a-letter-space)",
    "[data-hook=\"review-title\"]",
];

pub const INLINE_BODY: &[&str] = &[
    "[data-hook=\"review-body\"] span",
    "[data-hook=\"review-body\"]",
    "div[data-hook=\"review-collapsed\"]",
];

pub const REVIEW_STARS: &[&str] = &[
    "i[data-hook=\"review-star-rating\"]",
    "i[data-hook=\"cmps-review-star-rating\"]",
    "span.a-icon-alt",
];

pub const REVIEW_VERIFIED: &str = "[data-hook=\"avp-badge\"]";

pub const REVIEW_DATE: &[&str] = &["[data-hook=\"review-date\"]"];

// ── Histogram ──

pub const HISTOGRAM_CONTAINERS: &[&str] = &[
    "#cm_cr_dp_d_rating_histogram",
    "#histogramTable",
    "#reviewsMedley",
];

pub const HISTOGRAM_ROWS: &[&str] = &[
    "ul#histogramTable li",
    "#histogramTable li",
    "div[data-hook=\"histogram-table\"] tr",
    "tr.a-histogram-row",
    ".a-histogram-row",
    "table#histogramTable tr",
    "div[data-hook=\"rating-bar\"]",
];

pub const HISTOGRAM_METERS: &[&str] = &[".a-meter", ".a-meter-bar", "[role=\"progressbar\"]"];

pub const HISTOGRAM_RIGHT_CELLS: &[&str] = &[
    ".a-text-right span",
    ".a-text-right",
    "td:last-child",
];

// ── Review listing ──

pub const REVIEW_LIST_GROUPS: &[&str] = &[
    "li[data-hook=\"review\"]",
    "div[data-hook=\"review\"]",
    "#cm_cr-review_list .review",
];

pub const REVIEW_TITLE: &[&str] = &[
    "a[data-hook=\"review-title\"] span:not(.a-icon-alt):not(.a-letter-space)",
    "[data-hook=\"review-title\"] span:not(.a-icon-alt):not(.a-letter-space)",
    "[data-hook=\"review-title\"]",
    "a.review-title",
];

pub const REVIEW_TITLE_LINK: &[&str] = &["a[data-hook=\"review-title\"]", "a.review-title"];

pub const REVIEW_BODY: &[&str] = &[
    "[data-hook=\"review-body\"] span",
    "[data-hook=\"review-body\"]",
    "div[data-hook=\"review-collapsed\"]",
    "span.review-text-content",
];

pub const REVIEW_AUTHOR: &[&str] = &["[data-hook=\"review-author\"]", "span.a-profile-name"];

pub const REVIEW_HELPFUL: &[&str] = &[
    "[data-hook=\"helpful-vote-statement\"]",
    "span.cr-vote-text",
];
