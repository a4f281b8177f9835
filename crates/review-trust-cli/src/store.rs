//! JSON-lines file storage for acquisition output.
//!
//! ```text
//! <dir>/reviews.jsonl     one ReviewUpsert per (source, external_review_id)
//! <dir>/snapshots.jsonl   appended PageSnapshot records
//! <dir>/pages/*.html      raw product page HTML, one file per snapshot
//! <dir>/jobs.jsonl        job progress log
//! ```

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use review_trust::acquire::{AcquisitionJob, JobListener, ReviewSink, ReviewUpsert, SnapshotSink};
use review_trust::error::{TrustError, TrustResult};
use review_trust::heuristic::{self, ReviewHeuristic};
use review_trust::types::{PageSnapshot, ReviewRecord};
use serde::Serialize;

pub const REVIEWS_FILE: &str = "reviews.jsonl";
pub const SNAPSHOTS_FILE: &str = "snapshots.jsonl";
pub const JOBS_FILE: &str = "jobs.jsonl";
pub const PAGES_DIR: &str = "pages";

type ReviewKey = (String, String);
type ReviewIndex = BTreeMap<ReviewKey, (usize, ReviewUpsert)>;

/// One `reviews.jsonl` line: the upsert plus its per-product heuristic.
#[derive(Serialize)]
struct ReviewRow<'a> {
    #[serde(flatten)]
    upsert: &'a ReviewUpsert,
    heuristic_score: f64,
    heuristic_reasons: Vec<String>,
    heuristic_flag: bool,
}

/// File-backed review, snapshot and job store rooted at one directory.
pub struct JsonlStore {
    dir: PathBuf,
    /// Held across the file rewrite so writers apply in order.
    reviews: tokio::sync::Mutex<ReviewIndex>,
    write_lock: Mutex<()>,
}

impl JsonlStore {
    /// Open (creating if needed) a store, loading any reviews already on disk.
    pub fn open(dir: impl Into<PathBuf>) -> TrustResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join(PAGES_DIR))?;

        let mut reviews = BTreeMap::new();
        let path = dir.join(REVIEWS_FILE);
        if path.exists() {
            for (order, upsert) in read_jsonl::<ReviewUpsert>(&path)?.into_iter().enumerate() {
                let key = (upsert.source.clone(), upsert.external_review_id.clone());
                reviews.insert(key, (order, upsert));
            }
        }
        tracing::debug!(dir = %dir.display(), existing = reviews.len(), "opened output store");

        Ok(Self {
            dir,
            reviews: tokio::sync::Mutex::new(reviews),
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn review_count(&self) -> usize {
        self.reviews.lock().await.len()
    }

    fn append_line(&self, file: &str, line: &str) -> TrustResult<()> {
        let _guard = self.write_lock.lock().map_err(|_| TrustError::Sink("store lock poisoned".into()))?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))?;
        writeln!(f, "{line}")?;
        Ok(())
    }
}

#[async_trait]
impl ReviewSink for JsonlStore {
    async fn upsert(&self, review: &ReviewUpsert) -> TrustResult<()> {
        let mut reviews = self.reviews.lock().await;
        let key = (review.source.clone(), review.external_review_id.clone());
        let order = reviews.get(&key).map(|(o, _)| *o).unwrap_or(reviews.len());

        let mut next = reviews.clone();
        next.insert(key, (order, review.clone()));
        let contents = render_reviews(&next)?;

        let path = self.dir.join(REVIEWS_FILE);
        tokio::task::spawn_blocking(move || replace_file(&path, &contents))
            .await
            .map_err(|e| TrustError::Sink(format!("review write task failed: {e}")))??;

        *reviews = next;
        Ok(())
    }
}

#[async_trait]
impl SnapshotSink for JsonlStore {
    async fn persist(&self, snapshot: &PageSnapshot, raw_html: &str) -> TrustResult<()> {
        let stem = format!(
            "{}-{}",
            snapshot.product_id.as_deref().unwrap_or("unknown"),
            snapshot.captured_at.format("%Y%m%dT%H%M%S%3f")
        );
        let page = self.dir.join(PAGES_DIR).join(format!("{stem}.html"));
        fs::write(&page, raw_html)?;

        let mut value = serde_json::to_value(snapshot)?;
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "raw_html_path".into(),
                serde_json::Value::String(format!("{PAGES_DIR}/{stem}.html")),
            );
        }
        self.append_line(SNAPSHOTS_FILE, &value.to_string())
    }
}

impl JobListener for JsonlStore {
    fn on_update(&self, job: &AcquisitionJob) {
        let line = match serde_json::to_string(job) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "job update not serializable");
                return;
            }
        };
        if let Err(e) = self.append_line(JOBS_FILE, &line) {
            tracing::warn!(job_id = %job.id, error = %e, "failed to record job update");
        }
    }
}

/// Serialize the index in insertion order, scoring each product's reviews together.
fn render_reviews(reviews: &ReviewIndex) -> TrustResult<String> {
    let mut ordered: Vec<&(usize, ReviewUpsert)> = reviews.values().collect();
    ordered.sort_by_key(|(order, _)| *order);

    let mut by_product: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (pos, (_, upsert)) in ordered.iter().enumerate() {
        by_product.entry(upsert.product_id.as_str()).or_default().push(pos);
    }
    let mut scores: Vec<Option<ReviewHeuristic>> = vec![None; ordered.len()];
    for positions in by_product.values() {
        let records: Vec<ReviewRecord> = positions.iter().map(|&p| ordered[p].1.review.clone()).collect();
        for (&pos, verdict) in positions.iter().zip(heuristic::score_reviews(&records)) {
            scores[pos] = Some(verdict);
        }
    }

    let mut out = String::new();
    for ((_, upsert), verdict) in ordered.into_iter().zip(scores) {
        let verdict = verdict.unwrap_or(ReviewHeuristic {
            score: 0.0,
            reasons: Vec::new(),
            flag: false,
        });
        let row = ReviewRow {
            upsert,
            heuristic_score: verdict.score,
            heuristic_reasons: verdict.reasons,
            heuristic_flag: verdict.flag,
        };
        out.push_str(&serde_json::to_string(&row)?);
        out.push('\n');
    }
    Ok(out)
}

/// Swap `path` for `contents` through a sibling temp file.
fn replace_file(path: &Path, contents: &str) -> TrustResult<()> {
    let tmp = path.with_extension("jsonl.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> TrustResult<Vec<T>> {
    let file = fs::File::open(path)?;
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

/// Read reviews from a JSON array or a JSON-lines file.
///
/// Lines written by [`JsonlStore`] carry extra keys; they are ignored.
pub fn read_reviews(path: &Path) -> TrustResult<Vec<ReviewRecord>> {
    let text = fs::read_to_string(path)?;
    if text.trim_start().starts_with('[') {
        return Ok(serde_json::from_str(&text)?);
    }
    let mut out = Vec::new();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(line)
            .map_err(|e| TrustError::Config(format!("{}:{}: {e}", path.display(), n + 1)))?;
        out.push(record);
    }
    Ok(out)
}
