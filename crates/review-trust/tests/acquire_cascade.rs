//! Integration tests for the acquisition cascade.
//!
//! Fetchers are scripted per URL so each test pins exactly which stage
//! delivers what.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use review_trust::acquire::{
    AcquireConfig, AcquireRequest, AcquisitionJob, CancelFlag, ErrorCode, JobListener, JobState, Orchestrator,
    ReviewSink, ReviewUpsert, SnapshotSink,
};
use review_trust::error::{FetchError, TrustError, TrustResult};
use review_trust::fetch::{FetchMode, FetchOutcome, Fetcher};
use review_trust::types::PageSnapshot;

// ─────────────────────── fixtures ───────────────────────

const ASIN: &str = "B0TEST1234";

const LISTING: &str = r#"<html><body><div id="cm_cr-review_list">
  <li data-hook="review" id="R1">
    <span class="a-profile-name">Taro</span>
    <i data-hook="review-star-rating"><span class="a-icon-alt">5つ星のうち5.0</span></i>
    <span data-hook="review-title">最高</span>
    <span data-hook="review-body">とても良い商品でした。</span>
  </li>
  <li data-hook="review" id="R2">
    <span class="a-profile-name">Hanako</span>
    <i data-hook="review-star-rating"><span class="a-icon-alt">5つ星のうち3.0</span></i>
    <span data-hook="review-body">普通です。</span>
  </li>
  <li data-hook="review" id="R1">
    <span class="a-profile-name">Taro</span>
    <i data-hook="review-star-rating"><span class="a-icon-alt">5つ星のうち4.0</span></i>
    <span data-hook="review-body">編集しました。</span>
  </li>
</div></body></html>"#;

const PRODUCT: &str = r#"<html><body>
  <input type="hidden" id="ASIN" value="B0TEST1234">
  <span id="productTitle">テスト 商品</span>
  <div id="corePriceDisplay_desktop_feature_div"><span class="a-offscreen">￥1,980</span></div>
</body></html>"#;

const CAPTCHA: &str = r#"<html><head><title>Amazon CAPTCHA</title></head>
  <body><form action="/errors/validateCaptcha"></form></body></html>"#;

const EMPTY_PAGE: &str = "<html><body><div id=\"cm_cr-review_list\"></div></body></html>";

#[derive(Clone)]
enum Reply {
    Page(&'static str),
    Blocked,
    Fail(FetchError),
}

/// Fetcher answering from a per-path script; unknown paths fail as network errors.
struct ScriptedFetcher {
    mode: FetchMode,
    replies: HashMap<&'static str, Vec<Reply>>,
    calls: Mutex<Vec<String>>,
    cancel_on: Option<(&'static str, CancelFlag)>,
}

impl ScriptedFetcher {
    fn new(mode: FetchMode) -> Self {
        Self {
            mode,
            replies: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            cancel_on: None,
        }
    }

    /// Raise `flag` while answering a `kind` request, as an interrupt mid-fetch would.
    fn cancelling(mut self, kind: &'static str, flag: &CancelFlag) -> Self {
        self.cancel_on = Some((kind, flag.clone()));
        self
    }

    /// `kind` is `"reviews"` or `"product"`; replies are consumed in order and the last one repeats.
    fn on(mut self, kind: &'static str, replies: Vec<Reply>) -> Self {
        self.replies.insert(kind, replies);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    fn mode(&self) -> FetchMode {
        self.mode
    }

    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        let kind = if url.contains("/product-reviews/") { "reviews" } else { "product" };
        let seen = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(kind.to_string());
            calls.iter().filter(|c| c.as_str() == kind).count()
        };
        let script = self
            .replies
            .get(kind)
            .ok_or_else(|| FetchError::Network(format!("no script for {kind}")))?;
        let reply = script[(seen - 1).min(script.len() - 1)].clone();
        if let Some((on, flag)) = &self.cancel_on {
            if *on == kind {
                flag.cancel();
            }
        }
        match reply {
            Reply::Page(html) => Ok(FetchOutcome::inspect(html.to_string(), url.to_string(), 200)),
            Reply::Blocked => Ok(FetchOutcome::inspect(
                CAPTCHA.to_string(),
                "https://www.amazon.co.jp/errors/validateCaptcha".to_string(),
                200,
            )),
            Reply::Fail(e) => Err(e),
        }
    }
}

#[derive(Default)]
struct MemoryReviews {
    rows: Mutex<HashMap<(String, String), ReviewUpsert>>,
    fail_ids: Vec<&'static str>,
}

#[async_trait]
impl ReviewSink for MemoryReviews {
    async fn upsert(&self, review: &ReviewUpsert) -> TrustResult<()> {
        if self.fail_ids.contains(&review.external_review_id.as_str()) {
            return Err(TrustError::Sink("constraint violation".into()));
        }
        self.rows.lock().unwrap().insert(
            (review.source.clone(), review.external_review_id.clone()),
            review.clone(),
        );
        Ok(())
    }
}

#[derive(Default)]
struct MemorySnapshots {
    saved: Mutex<Vec<(PageSnapshot, usize)>>,
}

#[async_trait]
impl SnapshotSink for MemorySnapshots {
    async fn persist(&self, snapshot: &PageSnapshot, raw_html: &str) -> TrustResult<()> {
        self.saved.lock().unwrap().push((snapshot.clone(), raw_html.len()));
        Ok(())
    }
}

#[derive(Default)]
struct Recorder {
    states: Mutex<Vec<JobState>>,
    updates: AtomicUsize,
}

impl JobListener for Recorder {
    fn on_update(&self, job: &AcquisitionJob) {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut states = self.states.lock().unwrap();
        if states.last() != Some(&job.state) {
            states.push(job.state);
        }
    }
}

struct Harness {
    orchestrator: Orchestrator,
    reviews: Arc<MemoryReviews>,
    snapshots: Arc<MemorySnapshots>,
    listener: Arc<Recorder>,
}

fn harness(
    config: AcquireConfig,
    http: Arc<ScriptedFetcher>,
    browser: Option<Arc<ScriptedFetcher>>,
    reviews: MemoryReviews,
) -> Harness {
    let reviews = Arc::new(reviews);
    let snapshots = Arc::new(MemorySnapshots::default());
    let listener = Arc::new(Recorder::default());
    let mut orchestrator = Orchestrator::new(config, http, reviews.clone(), snapshots.clone())
        .with_listener(listener.clone());
    if let Some(browser) = browser {
        orchestrator = orchestrator.with_browser(browser);
    }
    Harness {
        orchestrator,
        reviews,
        snapshots,
        listener,
    }
}

fn request(target: &str) -> AcquireRequest {
    AcquireRequest {
        target_id: "target-1".into(),
        url_or_asin: target.into(),
        limit: None,
    }
}

// ─────────────────────── cascade ───────────────────────

#[tokio::test]
async fn test_http_success_stores_coalesced_reviews() {
    let http = Arc::new(
        ScriptedFetcher::new(FetchMode::Http)
            .on("reviews", vec![Reply::Page(LISTING)])
            .on("product", vec![Reply::Page(PRODUCT)]),
    );
    let h = harness(AcquireConfig::default(), http.clone(), None, MemoryReviews::default());

    let out = h
        .orchestrator
        .acquire(request(&format!("https://www.amazon.co.jp/dp/{ASIN}?th=1")), &CancelFlag::new())
        .await;

    assert!(out.job.success);
    assert!(!out.job.partial);
    assert!(!out.job.fallback_used);
    assert_eq!(out.job.error_code, None);
    assert_eq!(out.job.asin.as_deref(), Some(ASIN));
    assert_eq!(out.job.collected_count, 2);
    assert_eq!(out.job.upserted_count, 2);

    // Later duplicate wins but keeps the first position.
    assert_eq!(out.reviews[0].external_id, "R1");
    assert_eq!(out.reviews[0].rating, 4);
    assert_eq!(out.reviews[1].external_id, "R2");

    let rows = h.reviews.rows.lock().unwrap();
    let r1 = &rows[&("AMAZON".to_string(), "R1".to_string())];
    assert_eq!(r1.product_id, ASIN);
    assert_eq!(r1.target_id, "target-1");

    let snapshot = out.snapshot.expect("product snapshot");
    assert_eq!(snapshot.product_id.as_deref(), Some(ASIN));
    assert_eq!(h.snapshots.saved.lock().unwrap().len(), 1);

    assert_eq!(
        *h.listener.states.lock().unwrap(),
        vec![JobState::Queued, JobState::Running, JobState::Ok]
    );
    assert_eq!(http.calls(), vec!["reviews", "product"]);
}

#[tokio::test]
async fn test_blocked_http_recovered_by_browser() {
    let http = Arc::new(
        ScriptedFetcher::new(FetchMode::Http)
            .on("reviews", vec![Reply::Blocked])
            .on("product", vec![Reply::Blocked]),
    );
    let browser = Arc::new(
        ScriptedFetcher::new(FetchMode::Browser)
            .on("reviews", vec![Reply::Page(LISTING)])
            .on("product", vec![Reply::Page(PRODUCT)]),
    );
    let h = harness(
        AcquireConfig::default(),
        http.clone(),
        Some(browser.clone()),
        MemoryReviews::default(),
    );

    let out = h.orchestrator.acquire(request(ASIN), &CancelFlag::new()).await;

    assert!(out.job.success);
    assert!(out.job.fallback_used);
    assert!(!out.job.partial);
    assert_eq!(out.job.error_code, None);
    assert_eq!(out.job.upserted_count, 2);
    // The product snapshot comes from the stage that won.
    assert_eq!(http.calls(), vec!["reviews"]);
    assert_eq!(browser.calls(), vec!["reviews", "product"]);
}

#[tokio::test]
async fn test_all_blocked_but_product_page_reachable() {
    let http = Arc::new(
        ScriptedFetcher::new(FetchMode::Http)
            .on("reviews", vec![Reply::Blocked])
            .on("product", vec![Reply::Page(PRODUCT)]),
    );
    let browser = Arc::new(ScriptedFetcher::new(FetchMode::Browser).on("reviews", vec![Reply::Blocked]));
    let h = harness(AcquireConfig::default(), http, Some(browser), MemoryReviews::default());

    let out = h.orchestrator.acquire(request(ASIN), &CancelFlag::new()).await;

    assert!(out.job.success);
    assert!(out.job.partial);
    assert!(out.job.fallback_used);
    assert_eq!(out.job.collected_count, 0);
    assert!(out.reviews.is_empty());
    assert_eq!(out.snapshot.and_then(|s| s.title).as_deref(), Some("テスト 商品"));
    assert!(h.reviews.rows.lock().unwrap().is_empty());
    assert_eq!(h.snapshots.saved.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_everything_blocked_is_empty_or_captcha() {
    let http = Arc::new(
        ScriptedFetcher::new(FetchMode::Http)
            .on("reviews", vec![Reply::Blocked])
            .on("product", vec![Reply::Blocked]),
    );
    let browser = Arc::new(
        ScriptedFetcher::new(FetchMode::Browser)
            .on("reviews", vec![Reply::Blocked])
            .on("product", vec![Reply::Blocked]),
    );
    let h = harness(AcquireConfig::default(), http, Some(browser), MemoryReviews::default());

    let out = h.orchestrator.acquire(request(ASIN), &CancelFlag::new()).await;

    assert!(!out.job.success);
    assert_eq!(out.job.state, JobState::Failed);
    assert_eq!(out.job.error_code, Some(ErrorCode::EmptyOrCaptcha));
    assert_eq!(
        *h.listener.states.lock().unwrap(),
        vec![JobState::Queued, JobState::Running, JobState::Failed]
    );
}

#[tokio::test]
async fn test_empty_pages_are_no_reviews() {
    let http = Arc::new(
        ScriptedFetcher::new(FetchMode::Http)
            .on("reviews", vec![Reply::Page(EMPTY_PAGE)])
            .on("product", vec![Reply::Page(EMPTY_PAGE)]),
    );
    let config = AcquireConfig {
        browser_fallback: false,
        ..AcquireConfig::default()
    };
    let browser = Arc::new(ScriptedFetcher::new(FetchMode::Browser).on("reviews", vec![Reply::Page(LISTING)]));
    let h = harness(config, http, Some(browser.clone()), MemoryReviews::default());

    let out = h.orchestrator.acquire(request(ASIN), &CancelFlag::new()).await;

    assert_eq!(out.job.error_code, Some(ErrorCode::NoReviews));
    assert!(browser.calls().is_empty(), "browser stage is disabled");
}

#[tokio::test]
async fn test_network_failures_are_scrape_failed() {
    let http = Arc::new(
        ScriptedFetcher::new(FetchMode::Http)
            .on("reviews", vec![Reply::Fail(FetchError::Network("connection reset".into()))])
            .on("product", vec![Reply::Fail(FetchError::Network("connection reset".into()))]),
    );
    let h = harness(AcquireConfig::default(), http, None, MemoryReviews::default());

    let out = h.orchestrator.acquire(request(ASIN), &CancelFlag::new()).await;

    assert_eq!(out.job.error_code, Some(ErrorCode::ScrapeFailed));
    assert!(out.job.message.unwrap().contains("SCRAPE_FAILED(network)"));
}

#[tokio::test]
async fn test_timeout_retried_once_per_stage() {
    let timeout = FetchError::Timeout(Duration::from_secs(30));
    let http = Arc::new(
        ScriptedFetcher::new(FetchMode::Http)
            .on("reviews", vec![Reply::Fail(timeout), Reply::Page(LISTING)])
            .on("product", vec![Reply::Page(PRODUCT)]),
    );
    let h = harness(AcquireConfig::default(), http.clone(), None, MemoryReviews::default());

    let out = h.orchestrator.acquire(request(ASIN), &CancelFlag::new()).await;

    assert!(out.job.success);
    assert!(!out.job.fallback_used);
    assert_eq!(http.calls(), vec!["reviews", "reviews", "product"]);
}

#[tokio::test]
async fn test_login_failure_is_fatal() {
    let http = Arc::new(ScriptedFetcher::new(FetchMode::Http).on("reviews", vec![Reply::Blocked]));
    let browser = Arc::new(
        ScriptedFetcher::new(FetchMode::Browser)
            .on("reviews", vec![Reply::Fail(FetchError::LoginFailed("captcha unresolved".into()))]),
    );
    let h = harness(AcquireConfig::default(), http.clone(), Some(browser), MemoryReviews::default());

    let out = h.orchestrator.acquire(request(ASIN), &CancelFlag::new()).await;

    assert_eq!(out.job.error_code, Some(ErrorCode::ScrapeFailed));
    assert!(out.job.message.unwrap().contains("SCRAPE_FAILED(login)"));
    assert_eq!(http.calls(), vec!["reviews"], "no product page fallback after login failure");
}

#[tokio::test]
async fn test_failed_upsert_is_counted_out() {
    let http = Arc::new(
        ScriptedFetcher::new(FetchMode::Http)
            .on("reviews", vec![Reply::Page(LISTING)])
            .on("product", vec![Reply::Blocked]),
    );
    let sink = MemoryReviews {
        fail_ids: vec!["R2"],
        ..MemoryReviews::default()
    };
    let h = harness(AcquireConfig::default(), http, None, sink);

    let out = h.orchestrator.acquire(request(ASIN), &CancelFlag::new()).await;

    assert!(out.job.success);
    assert_eq!(out.job.collected_count, 2);
    assert_eq!(out.job.upserted_count, 1);
    assert!(out.snapshot.is_none(), "blocked product page is skipped");
    assert!(h.listener.updates.load(Ordering::SeqCst) >= 5);
}

#[tokio::test]
async fn test_limit_truncates_before_upsert() {
    let http = Arc::new(
        ScriptedFetcher::new(FetchMode::Http)
            .on("reviews", vec![Reply::Page(LISTING)])
            .on("product", vec![Reply::Page(PRODUCT)]),
    );
    let h = harness(AcquireConfig::default(), http, None, MemoryReviews::default());

    let mut req = request(ASIN);
    req.limit = Some(1);
    let out = h.orchestrator.acquire(req, &CancelFlag::new()).await;

    assert_eq!(out.job.collected_count, 1);
    assert_eq!(out.reviews[0].rating, 5);
}

#[tokio::test]
async fn test_zero_limit_uses_default() {
    let http = Arc::new(
        ScriptedFetcher::new(FetchMode::Http)
            .on("reviews", vec![Reply::Page(LISTING)])
            .on("product", vec![Reply::Page(PRODUCT)]),
    );
    let h = harness(AcquireConfig::default(), http, None, MemoryReviews::default());

    let mut req = request(ASIN);
    req.limit = Some(0);
    let out = h.orchestrator.acquire(req, &CancelFlag::new()).await;

    assert!(out.job.success);
    assert_eq!(out.job.collected_count, 2);
    assert_eq!(out.job.upserted_count, 2);
}

// ─────────────────────── rejections ───────────────────────

#[tokio::test]
async fn test_disabled_and_unresolvable_targets() {
    let http = Arc::new(ScriptedFetcher::new(FetchMode::Http));
    let config = AcquireConfig {
        enabled: false,
        ..AcquireConfig::default()
    };
    let h = harness(config, http.clone(), None, MemoryReviews::default());
    let out = h.orchestrator.acquire(request(ASIN), &CancelFlag::new()).await;
    assert_eq!(out.job.error_code, Some(ErrorCode::Disabled));

    let h = harness(AcquireConfig::default(), http.clone(), None, MemoryReviews::default());
    let out = h
        .orchestrator
        .acquire(request("https://example.com/not-a-product"), &CancelFlag::new())
        .await;
    assert_eq!(out.job.error_code, Some(ErrorCode::NotFound));
    assert_eq!(out.job.state, JobState::Failed);
    assert!(http.calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_first_stage() {
    let http = Arc::new(ScriptedFetcher::new(FetchMode::Http).on("reviews", vec![Reply::Page(LISTING)]));
    let h = harness(AcquireConfig::default(), http.clone(), None, MemoryReviews::default());

    let cancel = CancelFlag::new();
    cancel.cancel();
    let out = h.orchestrator.acquire(request(ASIN), &cancel).await;

    assert_eq!(out.job.error_code, Some(ErrorCode::Cancelled));
    assert!(http.calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_between_http_and_browser() {
    let cancel = CancelFlag::new();
    let http = Arc::new(
        ScriptedFetcher::new(FetchMode::Http)
            .on("reviews", vec![Reply::Blocked])
            .cancelling("reviews", &cancel),
    );
    let browser = Arc::new(ScriptedFetcher::new(FetchMode::Browser).on("reviews", vec![Reply::Page(LISTING)]));
    let h = harness(AcquireConfig::default(), http.clone(), Some(browser.clone()), MemoryReviews::default());

    let out = h.orchestrator.acquire(request(ASIN), &cancel).await;

    assert_eq!(out.job.error_code, Some(ErrorCode::Cancelled));
    assert_eq!(out.job.state, JobState::Failed);
    assert_eq!(http.calls(), vec!["reviews"]);
    assert!(browser.calls().is_empty());
}

#[tokio::test]
async fn test_cancelled_before_product_page_fallback() {
    let cancel = CancelFlag::new();
    let http = Arc::new(
        ScriptedFetcher::new(FetchMode::Http)
            .on("reviews", vec![Reply::Blocked])
            .on("product", vec![Reply::Page(PRODUCT)]),
    );
    let browser = Arc::new(
        ScriptedFetcher::new(FetchMode::Browser)
            .on("reviews", vec![Reply::Blocked])
            .cancelling("reviews", &cancel),
    );
    let h = harness(AcquireConfig::default(), http.clone(), Some(browser), MemoryReviews::default());

    let out = h.orchestrator.acquire(request(ASIN), &cancel).await;

    assert_eq!(out.job.error_code, Some(ErrorCode::Cancelled));
    assert_eq!(http.calls(), vec!["reviews"], "product page never requested");
    assert!(h.snapshots.saved.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelled_after_reviews_parsed() {
    let cancel = CancelFlag::new();
    let http = Arc::new(
        ScriptedFetcher::new(FetchMode::Http)
            .on("reviews", vec![Reply::Page(LISTING)])
            .on("product", vec![Reply::Page(PRODUCT)])
            .cancelling("reviews", &cancel),
    );
    let h = harness(AcquireConfig::default(), http.clone(), None, MemoryReviews::default());

    let out = h.orchestrator.acquire(request(ASIN), &cancel).await;

    assert_eq!(out.job.error_code, Some(ErrorCode::Cancelled));
    assert_eq!(http.calls(), vec!["reviews"]);
    assert!(h.reviews.rows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_cancelled_during_product_capture_skips_upserts() {
    let cancel = CancelFlag::new();
    let http = Arc::new(
        ScriptedFetcher::new(FetchMode::Http)
            .on("reviews", vec![Reply::Page(LISTING)])
            .on("product", vec![Reply::Page(PRODUCT)])
            .cancelling("product", &cancel),
    );
    let h = harness(AcquireConfig::default(), http.clone(), None, MemoryReviews::default());

    let out = h.orchestrator.acquire(request(ASIN), &cancel).await;

    assert_eq!(out.job.error_code, Some(ErrorCode::Cancelled));
    assert_eq!(out.job.upserted_count, 0);
    assert_eq!(http.calls(), vec!["reviews", "product"]);
    assert!(h.reviews.rows.lock().unwrap().is_empty());
}
