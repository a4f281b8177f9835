//! Review Trust — Amazon review acquisition and sakura-risk scoring.

pub mod acquire;
pub mod cache;
pub mod error;
pub mod features;
pub mod fetch;
pub mod fingerprint;
pub mod heuristic;
pub mod normalize;
pub mod parse;
pub mod scoring;
pub mod types;

pub use acquire::{
    AcquireConfig, AcquireRequest, Acquisition, AcquisitionJob, CancelFlag, ErrorCode, JobListener, JobResult,
    JobState, Orchestrator, ReviewSink, ReviewUpsert, SnapshotSink,
};
pub use cache::TtlCache;
pub use error::{FetchError, TrustError, TrustResult};
pub use features::{extract, FeatureSummary};
pub use fetch::{FetchMode, FetchOutcome, Fetcher};
pub use fingerprint::review_fingerprint;
pub use heuristic::{score_reviews as heuristic_scores, ProductStats, ReviewHeuristic};
pub use parse::{parse_histogram, parse_product_page, parse_review_list};
pub use scoring::{score, Judgment, Rank, ScoreResult, ScoreService, Thresholds, ThresholdsProvider};
pub use types::*;
