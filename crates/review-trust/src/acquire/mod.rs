//! Acquisition orchestrator: fetch → detect block → fallback cascade.
//!
//! ```text
//! INIT → TRY_HTTP → (blocked/empty) → TRY_BROWSER → (still blocked/empty)
//!      → TRY_PRODUCT_PAGE → DONE(success | partial | failed)
//! ```
//!
//! Each call runs one job on a single flow. Jobs share nothing except the
//! fetchers (and through the browser fetcher, the per-account session lock).

pub mod config;
pub mod job;
pub mod target;

pub use config::AcquireConfig;
pub use job::{AcquisitionJob, ErrorCode, JobResult, JobState};
pub use target::{product_url, resolve_asin, reviews_url};

use crate::error::{FetchError, TrustResult};
use crate::fetch::{FetchMode, FetchOutcome, Fetcher};
use crate::parse::{parse_product_page, reviews::parse_review_list_with_base};
use crate::types::{PageSnapshot, ReviewRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const SOURCE_AMAZON: &str = "AMAZON";

/// One review on its way to storage, keyed by `(source, external_review_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewUpsert {
    pub source: String,
    pub target_id: String,
    pub product_id: String,
    pub external_review_id: String,
    #[serde(flatten)]
    pub review: ReviewRecord,
}

/// Stores reviews. Implementations must be idempotent per key.
#[async_trait]
pub trait ReviewSink: Send + Sync {
    async fn upsert(&self, review: &ReviewUpsert) -> TrustResult<()>;
}

/// Stores product snapshots together with the HTML they came from.
#[async_trait]
pub trait SnapshotSink: Send + Sync {
    async fn persist(&self, snapshot: &PageSnapshot, raw_html: &str) -> TrustResult<()>;
}

/// Observes job progress.
pub trait JobListener: Send + Sync {
    fn on_update(&self, job: &AcquisitionJob);
}

/// Listener that ignores updates.
pub struct NoopListener;

impl JobListener for NoopListener {
    fn on_update(&self, _job: &AcquisitionJob) {}
}

/// Shared cancellation signal, checked between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquireRequest {
    pub target_id: String,
    /// Product URL, reviews URL, or bare ASIN.
    pub url_or_asin: String,
    pub limit: Option<usize>,
}

/// Everything one acquisition produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acquisition {
    pub job: JobResult,
    pub snapshot: Option<PageSnapshot>,
    pub reviews: Vec<ReviewRecord>,
}

/// Reviews fetched from one stage.
struct ReviewHit {
    reviews: Vec<ReviewRecord>,
    fetcher: Arc<dyn Fetcher>,
}

/// What the cascade observed on the way down.
#[derive(Default)]
struct CascadeLog {
    blocked: bool,
    loaded_empty: bool,
    last_error: Option<FetchError>,
}

enum Stop {
    Cancelled,
    Fatal(FetchError),
}

pub struct Orchestrator {
    config: AcquireConfig,
    http: Arc<dyn Fetcher>,
    browser: Option<Arc<dyn Fetcher>>,
    reviews: Arc<dyn ReviewSink>,
    snapshots: Arc<dyn SnapshotSink>,
    listener: Arc<dyn JobListener>,
}

impl Orchestrator {
    pub fn new(
        config: AcquireConfig,
        http: Arc<dyn Fetcher>,
        reviews: Arc<dyn ReviewSink>,
        snapshots: Arc<dyn SnapshotSink>,
    ) -> Self {
        Self {
            config,
            http,
            browser: None,
            reviews,
            snapshots,
            listener: Arc::new(NoopListener),
        }
    }

    pub fn with_browser(mut self, browser: Arc<dyn Fetcher>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn JobListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn config(&self) -> &AcquireConfig {
        &self.config
    }

    fn browser_stage(&self) -> Option<&Arc<dyn Fetcher>> {
        self.browser.as_ref().filter(|_| self.config.browser_fallback)
    }

    /// Run one acquisition job to a terminal state. Never panics, never errors:
    /// every failure ends up in the returned [`JobResult`].
    pub async fn acquire(&self, request: AcquireRequest, cancel: &CancelFlag) -> Acquisition {
        // Zero means "no explicit limit".
        let limit = request.limit.filter(|&n| n > 0).unwrap_or(self.config.default_limit);
        let mut job = AcquisitionJob::new(&request.target_id, limit);
        self.listener.on_update(&job);

        if !self.config.enabled {
            return self.fail(job, ErrorCode::Disabled, "scraping is disabled");
        }
        let Some(asin) = resolve_asin(&request.url_or_asin) else {
            return self.fail(job, ErrorCode::NotFound, format!("no ASIN in '{}'", request.url_or_asin));
        };
        job.asin = Some(asin.clone());
        self.advance(&mut job, JobState::Running);
        tracing::info!(job_id = %job.id, target = %job.target_id, %asin, limit, "acquisition started");

        let reviews_url = reviews_url(&self.config.base_url, &asin);
        let product_url = product_url(&self.config.base_url, &asin);
        let mut log = CascadeLog::default();

        let hit = match self.try_reviews(&job, &reviews_url, &mut log, cancel).await {
            Ok(hit) => hit,
            Err(stop) => return self.stop(job, stop),
        };

        if let Some(hit) = hit {
            job.fallback_used = hit.fetcher.mode() != FetchMode::Http;
            return self.store_reviews(job, hit, &product_url, limit, cancel).await;
        }

        // ── Product page fallback ──
        match self.try_product_page(&job, &product_url, &mut log, cancel).await {
            Ok(Some((snapshot, html))) => {
                job.fallback_used = true;
                self.persist_snapshot(&snapshot, &html).await;
                self.succeed(job, true, "reviews unavailable; captured product page only", Some(snapshot), Vec::new())
            }
            Ok(None) => {
                if log.blocked {
                    self.fail(job, ErrorCode::EmptyOrCaptcha, "all strategies blocked by sign-in or captcha")
                } else if log.loaded_empty {
                    self.fail(job, ErrorCode::NoReviews, "pages loaded but contained no reviews")
                } else {
                    let cause = log.last_error.unwrap_or(FetchError::Unavailable("no fetcher succeeded".into()));
                    self.scrape_failed(job, &cause)
                }
            }
            Err(stop) => self.stop(job, stop),
        }
    }

    /// HTTP stage, then the browser stage when HTTP was blocked, empty or failing.
    async fn try_reviews(
        &self,
        job: &AcquisitionJob,
        url: &str,
        log: &mut CascadeLog,
        cancel: &CancelFlag,
    ) -> Result<Option<ReviewHit>, Stop> {
        let mut stages: Vec<Arc<dyn Fetcher>> = vec![Arc::clone(&self.http)];
        if let Some(browser) = self.browser_stage() {
            stages.push(Arc::clone(browser));
        }

        for fetcher in stages {
            if cancel.is_cancelled() {
                return Err(Stop::Cancelled);
            }
            let mode = fetcher.mode();
            tracing::info!(job_id = %job.id, ?mode, "fetching reviews");
            match self.run_stage(fetcher.as_ref(), url).await {
                Ok(outcome) if outcome.blocked => {
                    tracing::warn!(job_id = %job.id, ?mode, url = %outcome.final_url, "reviews blocked");
                    log.blocked = true;
                }
                Ok(outcome) => {
                    let reviews = parse_review_list_with_base(&outcome.html, &self.config.base_url);
                    if reviews.is_empty() {
                        tracing::warn!(job_id = %job.id, ?mode, status = outcome.status, "no reviews on page");
                        log.loaded_empty = true;
                    } else {
                        tracing::info!(job_id = %job.id, ?mode, count = reviews.len(), "reviews parsed");
                        return Ok(Some(ReviewHit { reviews, fetcher }));
                    }
                }
                Err(e @ FetchError::LoginFailed(_)) => return Err(Stop::Fatal(e)),
                Err(e) => {
                    tracing::warn!(job_id = %job.id, ?mode, error = %e, "review stage failed");
                    log.last_error = Some(e);
                }
            }
        }
        Ok(None)
    }

    /// Product page over HTTP, then the browser if HTTP did not deliver.
    async fn try_product_page(
        &self,
        job: &AcquisitionJob,
        url: &str,
        log: &mut CascadeLog,
        cancel: &CancelFlag,
    ) -> Result<Option<(PageSnapshot, String)>, Stop> {
        let mut stages: Vec<Arc<dyn Fetcher>> = vec![Arc::clone(&self.http)];
        if let Some(browser) = self.browser_stage() {
            stages.push(Arc::clone(browser));
        }

        for fetcher in stages {
            if cancel.is_cancelled() {
                return Err(Stop::Cancelled);
            }
            let mode = fetcher.mode();
            tracing::info!(job_id = %job.id, ?mode, "product page fallback");
            match self.run_stage(fetcher.as_ref(), url).await {
                Ok(outcome) if outcome.blocked => {
                    tracing::warn!(job_id = %job.id, ?mode, "product page blocked");
                    log.blocked = true;
                }
                Ok(outcome) => {
                    let snapshot = parse_product_page(&outcome.html);
                    if snapshot.has_content() {
                        return Ok(Some((snapshot, outcome.html)));
                    }
                    log.loaded_empty = true;
                }
                Err(e @ FetchError::LoginFailed(_)) => return Err(Stop::Fatal(e)),
                Err(e) => {
                    tracing::warn!(job_id = %job.id, ?mode, error = %e, "product page stage failed");
                    log.last_error = Some(e);
                }
            }
        }
        Ok(None)
    }

    /// One fetch, retried once on timeout. A server error that outlived the
    /// fetcher's own retries fails the stage.
    async fn run_stage(&self, fetcher: &dyn Fetcher, url: &str) -> Result<FetchOutcome, FetchError> {
        let result = match fetcher.fetch(url).await {
            Err(e) if e.is_timeout() => {
                tracing::warn!(url, mode = ?fetcher.mode(), "stage timed out; retrying once");
                fetcher.fetch(url).await
            }
            other => other,
        };
        match result {
            Ok(outcome) if outcome.status >= 500 => {
                Err(FetchError::Network(format!("server returned HTTP {}", outcome.status)))
            }
            other => other,
        }
    }

    async fn store_reviews(
        &self,
        mut job: AcquisitionJob,
        hit: ReviewHit,
        product_url: &str,
        limit: usize,
        cancel: &CancelFlag,
    ) -> Acquisition {
        if cancel.is_cancelled() {
            return self.stop(job, Stop::Cancelled);
        }
        let snapshot = self.capture_product(&job, hit.fetcher.as_ref(), product_url).await;

        let mut reviews = hit.reviews;
        reviews.truncate(limit);
        let reviews = coalesce_by_id(reviews);
        job.collected_count = reviews.len();
        self.listener.on_update(&job);

        if cancel.is_cancelled() {
            return self.stop(job, Stop::Cancelled);
        }
        let product_id = job.asin.clone().unwrap_or_default();
        for review in &reviews {
            let upsert = ReviewUpsert {
                source: SOURCE_AMAZON.to_string(),
                target_id: job.target_id.clone(),
                product_id: product_id.clone(),
                external_review_id: review.external_id.clone(),
                review: review.clone(),
            };
            match self.reviews.upsert(&upsert).await {
                Ok(()) => job.upserted_count += 1,
                Err(e) => tracing::warn!(job_id = %job.id, review = %review.external_id, error = %e, "review upsert failed"),
            }
            self.listener.on_update(&job);
        }

        let message = format!(
            "collected {} reviews, upserted {}",
            job.collected_count, job.upserted_count
        );
        self.succeed(job, false, message, snapshot, reviews)
    }

    /// Best-effort product page capture with the fetcher that delivered the reviews.
    async fn capture_product(&self, job: &AcquisitionJob, fetcher: &dyn Fetcher, url: &str) -> Option<PageSnapshot> {
        match self.run_stage(fetcher, url).await {
            Ok(outcome) if !outcome.blocked => {
                let snapshot = parse_product_page(&outcome.html);
                if !snapshot.has_content() {
                    return None;
                }
                self.persist_snapshot(&snapshot, &outcome.html).await;
                Some(snapshot)
            }
            Ok(_) => {
                tracing::warn!(job_id = %job.id, "product page blocked; snapshot skipped");
                None
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "product page capture failed");
                None
            }
        }
    }

    async fn persist_snapshot(&self, snapshot: &PageSnapshot, html: &str) {
        if let Err(e) = self.snapshots.persist(snapshot, html).await {
            tracing::warn!(product = ?snapshot.product_id, error = %e, "snapshot persist failed");
        }
    }

    fn advance(&self, job: &mut AcquisitionJob, next: JobState) {
        match job.transition(next) {
            Ok(()) => self.listener.on_update(job),
            Err(e) => tracing::warn!(job_id = %job.id, error = %e, "job transition rejected"),
        }
    }

    fn succeed(
        &self,
        mut job: AcquisitionJob,
        partial: bool,
        message: impl Into<String>,
        snapshot: Option<PageSnapshot>,
        reviews: Vec<ReviewRecord>,
    ) -> Acquisition {
        if let Err(e) = job.succeed(message) {
            tracing::warn!(job_id = %job.id, error = %e, "job transition rejected");
        }
        tracing::info!(
            job_id = %job.id,
            collected = job.collected_count,
            upserted = job.upserted_count,
            fallback_used = job.fallback_used,
            partial,
            "acquisition finished"
        );
        self.listener.on_update(&job);
        Acquisition {
            job: JobResult::from_job(&job, partial),
            snapshot,
            reviews,
        }
    }

    fn fail(&self, mut job: AcquisitionJob, code: ErrorCode, message: impl Into<String>) -> Acquisition {
        let message = message.into();
        if let Err(e) = job.fail(code, message.clone()) {
            tracing::warn!(job_id = %job.id, error = %e, "job transition rejected");
        }
        if code == ErrorCode::ScrapeFailed {
            tracing::error!(job_id = %job.id, code = code.as_str(), %message, "acquisition failed");
        } else {
            tracing::warn!(job_id = %job.id, code = code.as_str(), %message, "acquisition ended without reviews");
        }
        self.listener.on_update(&job);
        Acquisition {
            job: JobResult::from_job(&job, false),
            snapshot: None,
            reviews: Vec::new(),
        }
    }

    fn scrape_failed(&self, job: AcquisitionJob, cause: &FetchError) -> Acquisition {
        self.fail(job, ErrorCode::ScrapeFailed, format!("SCRAPE_FAILED({}): {cause}", cause.cause()))
    }

    fn stop(&self, job: AcquisitionJob, stop: Stop) -> Acquisition {
        match stop {
            Stop::Cancelled => self.fail(job, ErrorCode::Cancelled, "cancelled"),
            Stop::Fatal(e) => self.scrape_failed(job, &e),
        }
    }
}

/// Collapse records sharing an id; the later record wins, in the earlier one's position.
fn coalesce_by_id(reviews: Vec<ReviewRecord>) -> Vec<ReviewRecord> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<ReviewRecord> = Vec::with_capacity(reviews.len());
    for review in reviews {
        match index.get(&review.external_id) {
            Some(&i) => out[i] = review,
            None => {
                index.insert(review.external_id.clone(), out.len());
                out.push(review);
            }
        }
    }
    out
}
