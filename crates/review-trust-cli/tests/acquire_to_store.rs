//! Acquisition into the JSON-lines store, then scoring from the written file.

use std::sync::Arc;

use async_trait::async_trait;

use review_trust::acquire::{AcquireConfig, AcquireRequest, AcquisitionJob, CancelFlag, JobState, Orchestrator};
use review_trust::error::FetchError;
use review_trust::fetch::{FetchMode, FetchOutcome, Fetcher};
use review_trust::features::extract;
use review_trust::scoring::{score, Thresholds};

use review_trust_cli::store::{JOBS_FILE, PAGES_DIR, REVIEWS_FILE, SNAPSHOTS_FILE};
use review_trust_cli::{read_reviews, JsonlStore};

const LISTING: &str = r#"<html><body>
  <li data-hook="review" id="RS1">
    <span class="a-profile-name">Aki</span>
    <i data-hook="review-star-rating"><span class="a-icon-alt">5つ星のうち5.0</span></i>
    <span data-hook="review-body">梱包も丁寧で、届いてすぐに使えました。</span>
  </li>
  <li data-hook="review" id="RS2">
    <span class="a-profile-name">Mei</span>
    <i data-hook="review-star-rating"><span class="a-icon-alt">5つ星のうち2.0</span></i>
    <span data-hook="review-body">すぐ壊れました。</span>
  </li>
</body></html>"#;

const PRODUCT: &str = r#"<html><body>
  <input type="hidden" id="ASIN" value="B0STORE001">
  <span id="productTitle">Store Product</span>
</body></html>"#;

/// Serves the listing for review URLs and the product page otherwise.
struct StaticSite;

#[async_trait]
impl Fetcher for StaticSite {
    fn mode(&self) -> FetchMode {
        FetchMode::Http
    }

    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        let html = if url.contains("/product-reviews/") { LISTING } else { PRODUCT };
        Ok(FetchOutcome::inspect(html.to_string(), url.to_string(), 200))
    }
}

#[tokio::test]
async fn test_acquire_writes_all_files() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonlStore::open(dir.path()).unwrap());
    let orchestrator = Orchestrator::new(
        AcquireConfig::default(),
        Arc::new(StaticSite),
        store.clone(),
        store.clone(),
    )
    .with_listener(store.clone());

    let out = orchestrator
        .acquire(
            AcquireRequest {
                target_id: "cli".into(),
                url_or_asin: "B0STORE001".into(),
                limit: None,
            },
            &CancelFlag::new(),
        )
        .await;
    assert!(out.job.success);
    assert_eq!(out.job.upserted_count, 2);

    let reviews = read_reviews(&dir.path().join(REVIEWS_FILE)).unwrap();
    assert_eq!(reviews.len(), 2);
    assert_eq!(reviews[0].external_id, "RS1");

    let snapshots = std::fs::read_to_string(dir.path().join(SNAPSHOTS_FILE)).unwrap();
    assert_eq!(snapshots.lines().count(), 1);
    let pages = std::fs::read_dir(dir.path().join(PAGES_DIR)).unwrap().count();
    assert_eq!(pages, 1);

    let jobs: Vec<AcquisitionJob> = std::fs::read_to_string(dir.path().join(JOBS_FILE))
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(jobs.first().unwrap().state, JobState::Queued);
    assert_eq!(jobs.last().unwrap().state, JobState::Ok);
    assert!(jobs.iter().all(|j| j.id == out.job.job_id));

    // A second run upserts the same keys instead of duplicating them.
    let again = orchestrator
        .acquire(
            AcquireRequest {
                target_id: "cli".into(),
                url_or_asin: "B0STORE001".into(),
                limit: None,
            },
            &CancelFlag::new(),
        )
        .await;
    assert!(again.job.success);
    assert_eq!(read_reviews(&dir.path().join(REVIEWS_FILE)).unwrap().len(), 2);

    let result = score(&extract(&reviews), &Thresholds::default());
    assert_eq!(result.metrics["total_reviews"], 2);
    assert_eq!(result.display_score, 100 - result.risk_score);
}
